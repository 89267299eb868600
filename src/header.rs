use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::types::{RecordingHeader, SignalHeader};
use crate::utils::{atoi_nonlocalized, field_text, fit_field, is_integer_number};
use crate::{EDF_HEADER_BLOCK, EDF_MAX_SIGNALS};

/// Width of each per-signal field, in the order they appear in the header.
const SIGNAL_FIELD_WIDTHS: [usize; 10] = [16, 80, 8, 8, 8, 8, 8, 80, 8, 32];

/// Reads and validates the header of the EDF file at `path`.
///
/// Only the header bytes are consumed; the data records are left untouched.
///
/// # Errors
///
/// * `ConvertError::Read` - the platform denied read access
/// * `ConvertError::Validation` - the file does not exist
/// * `ConvertError::Parse` - the byte layout is not a consistent EDF header
pub fn parse_header<P: AsRef<Path>>(path: P) -> Result<RecordingHeader> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ConvertError::reading(path, e))?;
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader, path)?;
    debug!(
        path = %path.display(),
        signals = header.signal_count(),
        records = header.record_count,
        "parsed header"
    );
    Ok(header)
}

/// Writes `header` to a new file at `path`, replacing any previous content.
pub fn write_header<P: AsRef<Path>>(header: &RecordingHeader, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path).map_err(|e| ConvertError::writing(path, e))?;
    file.write_all(&header.to_bytes())
        .map_err(|e| ConvertError::writing(path, e))?;
    file.flush().map_err(|e| ConvertError::writing(path, e))?;
    Ok(())
}

/// Overwrites the header of an existing recording without touching its data records.
///
/// The new header must occupy exactly as many bytes as the one on disk,
/// otherwise every data record would shift.
pub fn rewrite_header<P: AsRef<Path>>(header: &RecordingHeader, path: P) -> Result<()> {
    let path = path.as_ref();
    let on_disk = parse_header(path)?;
    let bytes = header.to_bytes();
    if bytes.len() != on_disk.header_bytes {
        return Err(ConvertError::Validation(format!(
            "header of {} bytes cannot replace {} bytes in {}",
            bytes.len(),
            on_disk.header_bytes,
            path.display()
        )));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ConvertError::writing(path, e))?;
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.write_all(&bytes))
        .and_then(|_| file.flush())
        .map_err(|e| ConvertError::writing(path, e))?;
    Ok(())
}

/// Reads data record `index` from an open recording.
pub fn read_block<R: Read + Seek>(
    reader: &mut R,
    header: &RecordingHeader,
    index: usize,
) -> std::io::Result<Vec<u8>> {
    let record_size = header.record_size();
    let offset = header.header_bytes as u64 + index as u64 * record_size as u64;
    reader.seek(SeekFrom::Start(offset))?;
    let mut block = vec![0u8; record_size];
    reader.read_exact(&mut block)?;
    Ok(block)
}

/// Appends one data record to an output stream.
pub fn write_block<W: Write>(writer: &mut W, block: &[u8]) -> std::io::Result<()> {
    writer.write_all(block)
}

/// Copies `src` to `dest` record by record, header unchanged.
pub fn copy_recording<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dest: Q) -> Result<usize> {
    let header = parse_header(src.as_ref())?;
    copy_recording_with_header(src, dest, &header)
}

/// Copies the data records of `src` to `dest` under a replacement header.
///
/// Records are copied in order. A failure part way leaves a truncated `dest`
/// behind; removing it is up to the caller. Both handles are closed on
/// every exit path. Returns the number of records copied.
pub fn copy_recording_with_header<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dest: Q,
    header: &RecordingHeader,
) -> Result<usize> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    let file_in = File::open(src).map_err(|e| ConvertError::reading(src, e))?;
    let source_len = file_in
        .metadata()
        .map_err(|e| ConvertError::reading(src, e))?
        .len();
    let mut reader = BufReader::new(file_in);
    let source = read_header(&mut reader, src)?;

    if source.record_size() != header.record_size() {
        return Err(ConvertError::Validation(format!(
            "replacement header describes {}-byte records, {} has {}-byte records",
            header.record_size(),
            src.display(),
            source.record_size()
        )));
    }

    let record_count = data_record_count(&source, source_len);

    let file_out = File::create(dest).map_err(|e| ConvertError::writing(dest, e))?;
    let mut writer = BufWriter::new(file_out);
    writer
        .write_all(&header.to_bytes())
        .map_err(|e| ConvertError::writing(dest, e))?;

    for index in 0..record_count {
        let block =
            read_block(&mut reader, &source, index).map_err(|e| ConvertError::reading(src, e))?;
        write_block(&mut writer, &block).map_err(|e| ConvertError::writing(dest, e))?;
    }
    writer.flush().map_err(|e| ConvertError::writing(dest, e))?;

    debug!(
        src = %src.display(),
        dest = %dest.display(),
        records = record_count,
        "copied recording"
    );
    Ok(record_count)
}

/// Number of data records in a file of `file_len` bytes.
///
/// A declared count of `-1` (recording not finalized) is derived from the
/// bytes following the header.
pub(crate) fn data_record_count(header: &RecordingHeader, file_len: u64) -> usize {
    match header.record_count {
        n if n >= 0 => n as usize,
        _ if header.record_size() == 0 => 0,
        _ => {
            let data_len = file_len.saturating_sub(header.header_bytes as u64);
            (data_len / header.record_size() as u64) as usize
        }
    }
}

fn read_header<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<RecordingHeader> {
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| ConvertError::reading(path, e))?;

    // 读取主头部（256字节）
    let mut bytes = vec![0u8; EDF_HEADER_BLOCK];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| ConvertError::reading(path, e))?;

    let signal_count = signal_count(&bytes).map_err(|m| ConvertError::parse(path, m))?;
    let declared = declared_header_bytes(&bytes).map_err(|m| ConvertError::parse(path, m))?;
    if declared != (signal_count + 1) * EDF_HEADER_BLOCK {
        return Err(ConvertError::parse(
            path,
            format!(
                "header-byte-count is {} but {} signals need {}",
                declared,
                signal_count,
                (signal_count + 1) * EDF_HEADER_BLOCK
            ),
        ));
    }

    // 读取信号头部信息
    bytes.resize(declared, 0);
    reader
        .read_exact(&mut bytes[EDF_HEADER_BLOCK..])
        .map_err(|e| ConvertError::reading(path, e))?;

    RecordingHeader::decode(&bytes).map_err(|m| ConvertError::parse(path, m))
}

fn signal_count(main: &[u8]) -> std::result::Result<usize, String> {
    let text = field_text(&main[252..256]);
    if !is_integer_number(&text) {
        return Err(format!("signal count {:?} is not a number", text));
    }
    let count = atoi_nonlocalized(&text);
    if count < 1 || count as usize > EDF_MAX_SIGNALS {
        return Err(format!("invalid number of signals: {}", count));
    }
    Ok(count as usize)
}

fn declared_header_bytes(main: &[u8]) -> std::result::Result<usize, String> {
    let text = field_text(&main[184..192]);
    text.trim()
        .parse::<usize>()
        .map_err(|_| format!("header-byte-count {:?} is not a number", text))
}

/// Text of per-signal field `column`; column 8 (samples per record) is numeric.
fn signal_text(s: &SignalHeader, column: usize) -> &str {
    match column {
        0 => s.label.as_str(),
        1 => s.transducer.as_str(),
        2 => s.physical_dimension.as_str(),
        3 => s.physical_min.as_str(),
        4 => s.physical_max.as_str(),
        5 => s.digital_min.as_str(),
        6 => s.digital_max.as_str(),
        7 => s.prefilter.as_str(),
        _ => s.reserved.as_str(),
    }
}

/// Re-encodes `out[offset..offset + width]` unless it already reads as `value`.
fn put_text(out: &mut [u8], offset: usize, width: usize, value: &str) {
    let slot = &mut out[offset..offset + width];
    if field_text(slot) != value {
        slot.copy_from_slice(&fit_field(value, width));
    }
}

/// Like [`put_text`], comparing numerically so `+5` or `0256` stay as written.
fn put_number(out: &mut [u8], offset: usize, width: usize, value: i64) {
    let slot = &mut out[offset..offset + width];
    if field_text(slot).trim().parse::<i64>().ok() != Some(value) {
        slot.copy_from_slice(&fit_field(&value.to_string(), width));
    }
}

impl RecordingHeader {
    /// Parses a complete header held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let path = Path::new("<buffer>");
        if bytes.len() < EDF_HEADER_BLOCK {
            return Err(ConvertError::parse(path, "buffer shorter than the main header"));
        }
        let signal_count = signal_count(bytes).map_err(|m| ConvertError::parse(path, m))?;
        let declared = declared_header_bytes(bytes).map_err(|m| ConvertError::parse(path, m))?;
        if declared != (signal_count + 1) * EDF_HEADER_BLOCK || bytes.len() < declared {
            return Err(ConvertError::parse(
                path,
                format!("header-byte-count {} does not match the layout", declared),
            ));
        }
        Self::decode(&bytes[..declared]).map_err(|m| ConvertError::parse(path, m))
    }

    /// Decodes a header whose length has already been checked.
    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let version = field_text(&bytes[0..8]);
        if !version.trim_start().starts_with('0') {
            return Err(format!("not an EDF file, version field is {:?}", version));
        }

        let record_text = field_text(&bytes[236..244]);
        if !is_integer_number(&record_text) {
            return Err(format!("record count {:?} is not a number", record_text));
        }
        let record_count: i64 = record_text
            .trim()
            .trim_start_matches('+')
            .parse()
            .map_err(|_| format!("record count {:?} out of range", record_text))?;

        let ns = signal_count(bytes)?;
        let fields = &bytes[EDF_HEADER_BLOCK..];

        // 字段按列存储：所有标签，然后所有传感器类型，依此类推
        let mut columns: Vec<Vec<String>> = Vec::with_capacity(SIGNAL_FIELD_WIDTHS.len());
        let mut start = 0;
        for width in SIGNAL_FIELD_WIDTHS {
            let column = (0..ns)
                .map(|i| field_text(&fields[start + i * width..start + (i + 1) * width]))
                .collect();
            columns.push(column);
            start += ns * width;
        }

        let mut signals = Vec::with_capacity(ns);
        for i in 0..ns {
            let samples_text = &columns[8][i];
            if !is_integer_number(samples_text) || atoi_nonlocalized(samples_text) < 0 {
                return Err(format!(
                    "samples per record {:?} of signal {} is invalid",
                    samples_text, i
                ));
            }
            signals.push(SignalHeader {
                label: columns[0][i].clone(),
                transducer: columns[1][i].clone(),
                physical_dimension: columns[2][i].clone(),
                physical_min: columns[3][i].clone(),
                physical_max: columns[4][i].clone(),
                digital_min: columns[5][i].clone(),
                digital_max: columns[6][i].clone(),
                prefilter: columns[7][i].clone(),
                samples_per_record: atoi_nonlocalized(samples_text) as usize,
                reserved: columns[9][i].clone(),
            });
        }

        Ok(RecordingHeader {
            version,
            patient_id: field_text(&bytes[8..88]),
            recording_id: field_text(&bytes[88..168]),
            start_date: field_text(&bytes[168..176]),
            start_time: field_text(&bytes[176..184]),
            header_bytes: (ns + 1) * EDF_HEADER_BLOCK,
            reserved: field_text(&bytes[192..236]),
            record_count,
            record_duration: field_text(&bytes[244..252]),
            signals,
            raw: bytes.to_vec(),
        })
    }

    /// Serializes the header to exactly `(signals + 1) * 256` bytes.
    ///
    /// Fields still holding the value they were decoded from keep their
    /// original bytes; edited fields are re-encoded as space-padded ASCII.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ns = self.signals.len();
        let header_bytes = (ns + 1) * EDF_HEADER_BLOCK;
        let mut out = if self.raw.len() == header_bytes {
            self.raw.clone()
        } else {
            vec![b' '; header_bytes]
        };

        put_text(&mut out, 0, 8, &self.version);
        put_text(&mut out, 8, 80, &self.patient_id);
        put_text(&mut out, 88, 80, &self.recording_id);
        put_text(&mut out, 168, 8, &self.start_date);
        put_text(&mut out, 176, 8, &self.start_time);
        put_number(&mut out, 184, 8, header_bytes as i64);
        put_text(&mut out, 192, 44, &self.reserved);
        put_number(&mut out, 236, 8, self.record_count);
        put_text(&mut out, 244, 8, &self.record_duration);
        put_number(&mut out, 252, 4, ns as i64);

        // 字段按列存储
        let mut start = EDF_HEADER_BLOCK;
        for (column, width) in SIGNAL_FIELD_WIDTHS.into_iter().enumerate() {
            for (i, signal) in self.signals.iter().enumerate() {
                let offset = start + i * width;
                if column == 8 {
                    put_number(&mut out, offset, width, signal.samples_per_record as i64);
                } else {
                    put_text(&mut out, offset, width, signal_text(signal, column));
                }
            }
            start += ns * width;
        }

        out
    }

    /// Recording start as a calendar date and time.
    ///
    /// Two-digit years follow the EDF clipping rule: 85-99 map to the
    /// 1900s, everything else to the 2000s.
    pub fn start_datetime(&self) -> Result<NaiveDateTime> {
        let path = Path::new("<header>");
        let invalid = || {
            ConvertError::parse(
                path,
                format!("invalid start {:?} {:?}", self.start_date, self.start_time),
            )
        };

        // 解析日期 "dd.mm.yy"
        let date: Vec<&str> = self.start_date.split('.').collect();
        let time: Vec<&str> = self.start_time.split('.').collect();
        if date.len() != 3 || time.len() != 3 {
            return Err(invalid());
        }

        let yy = atoi_nonlocalized(date[2]);
        let year = if yy > 84 { 1900 + yy } else { 2000 + yy };
        let start_date = NaiveDate::from_ymd_opt(
            year,
            atoi_nonlocalized(date[1]) as u32,
            atoi_nonlocalized(date[0]) as u32,
        )
        .ok_or_else(invalid)?;

        // 解析时间 "hh.mm.ss"
        let start_time = NaiveTime::from_hms_opt(
            atoi_nonlocalized(time[0]) as u32,
            atoi_nonlocalized(time[1]) as u32,
            atoi_nonlocalized(time[2]) as u32,
        )
        .ok_or_else(invalid)?;

        Ok(start_date.and_time(start_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest_utils::{build_header, write_test_recording};
    use crate::types::HeaderField;
    use chrono::{Datelike, Timelike};
    use tempfile::tempdir;

    #[test]
    fn test_to_bytes_length_matches_declared_size() {
        let header = build_header("P001", &["EEG Fp1", "ECG", "EDF Annotations"], 4);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 4 * 256);
        assert_eq!(&bytes[184..192], b"1024    ");
        assert_eq!(&bytes[252..256], b"3   ");
    }

    #[test]
    fn test_from_bytes_round_trip() {
        let header = build_header("P001 M 01-JAN-1990 Doe", &["C3-EEG", "LFlex1"], 7);
        let parsed = RecordingHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.to_bytes(), header.to_bytes());
    }

    #[test]
    fn test_to_bytes_keeps_unedited_source_bytes() {
        let mut bytes = build_header("P001", &["EEG", "ECG"], 3).to_bytes();
        bytes[88] = 0xE9;
        bytes[90..92].copy_from_slice(&[0xC3, 0xA9]);
        bytes[192..236].fill(0);
        bytes[236..244].copy_from_slice(b"+3      ");
        bytes[184..192].copy_from_slice(b"0768    ");

        let mut header = RecordingHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.record_count, 3);
        assert_eq!(header.to_bytes(), bytes);

        header.set_field(HeaderField::PatientId, "X X X X");
        let edited = header.to_bytes();
        assert_eq!(&edited[8..88], fit_field("X X X X", 80).as_slice());
        assert_eq!(&edited[..8], &bytes[..8]);
        assert_eq!(&edited[88..], &bytes[88..]);
    }

    #[test]
    fn test_header_byte_count_mismatch_is_parse_error() {
        let header = build_header("P001", &["EEG"], 1);
        let mut bytes = header.to_bytes();
        bytes[184..192].copy_from_slice(b"768     ");
        let err = RecordingHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ConvertError::Parse { .. }));
    }

    #[test]
    fn test_bad_version_is_rejected() {
        let header = build_header("P001", &["EEG"], 1);
        let mut bytes = header.to_bytes();
        bytes[0] = 0xFF;
        assert!(matches!(
            RecordingHeader::from_bytes(&bytes),
            Err(ConvertError::Parse { .. })
        ));
    }

    #[test]
    fn test_truncated_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.edf");
        let header = build_header("P001", &["EEG", "EOG"], 1);
        let bytes = header.to_bytes();
        std::fs::write(&path, &bytes[..400]).unwrap();

        let err = parse_header(&path).unwrap_err();
        assert!(matches!(err, ConvertError::Parse { .. }), "{err}");
    }

    #[test]
    fn test_missing_file_is_validation_error() {
        let dir = tempdir().unwrap();
        let err = parse_header(dir.path().join("nope.edf")).unwrap_err();
        assert!(matches!(err, ConvertError::Validation(_)));
    }

    #[test]
    fn test_read_block_returns_records_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        let header = write_test_recording(&path, "P001", &["EEG", "EOG"], 3).unwrap();

        let mut file = File::open(&path).unwrap();
        for index in 0..3 {
            let block = read_block(&mut file, &header, index).unwrap();
            assert_eq!(block.len(), header.record_size());
            assert!(block.iter().all(|&b| b == index as u8));
        }
    }

    #[test]
    fn test_copy_recording_with_unknown_record_count() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.edf");
        let dest = dir.path().join("dest.edf");
        let mut header = write_test_recording(&src, "P001", &["EEG"], 4).unwrap();

        header.record_count = -1;
        rewrite_header(&header, &src).unwrap();

        let copied = copy_recording(&src, &dest).unwrap();
        assert_eq!(copied, 4);
        assert_eq!(std::fs::read(&src).unwrap(), std::fs::read(&dest).unwrap());
    }

    #[test]
    fn test_rewrite_header_rejects_different_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        write_test_recording(&path, "P001", &["EEG"], 1).unwrap();

        let bigger = build_header("P001", &["EEG", "EOG"], 1);
        assert!(matches!(
            rewrite_header(&bigger, &path),
            Err(ConvertError::Validation(_))
        ));
    }

    #[test]
    fn test_start_datetime() {
        let mut header = build_header("P001", &["EEG"], 1);
        header.start_date = "02.03.98".to_string();
        header.start_time = "13.14.15".to_string();
        let start = header.start_datetime().unwrap();
        assert_eq!((start.year(), start.month(), start.day()), (1998, 3, 2));
        assert_eq!((start.hour(), start.minute(), start.second()), (13, 14, 15));

        header.start_date = "yy.mm.dd".to_string();
        assert!(header.start_datetime().is_err());
    }
}
