// pitr.rs
use chrono::NaiveDateTime;

use super::store::join_name;
use super::types::{Compression, OplogTs, PitrChunk};

/// Storage prefix holding oplog slices.
pub const PITR_FS_PREFIX: &str = "pbmPitr";

const TS_FORMAT: &str = "%Y%m%d%H%M%S";

/// Decodes a chunk descriptor from a name relative to [`PITR_FS_PREFIX`]:
/// `<rs>/<YYYYMMDD>/<start>.<end>.oplog[.<compression>]`.
/// Returns `None` for anything that does not follow that layout.
pub fn chunk_from_fname(fname: &str, size: u64) -> Option<PitrChunk> {
    let segments: Vec<&str> = fname.split('/').collect();
    let [rs, day, file] = segments[..] else {
        return None;
    };
    if rs.is_empty() || day.len() != 8 || !day.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let parts: Vec<&str> = file.split('.').collect();
    if parts.len() < 3 || parts.len() > 4 || parts[2] != "oplog" {
        return None;
    }
    let compression = match parts.get(3) {
        Some(ext) => Compression::from_extension(ext)?,
        None => Compression::None,
    };

    let start_ts = parse_oplog_ts(parts[0])?;
    let end_ts = parse_oplog_ts(parts[1])?;

    Some(PitrChunk {
        rs: rs.to_string(),
        fname: join_name(&[PITR_FS_PREFIX, fname]),
        compression,
        start_ts,
        end_ts,
        size,
    })
}

/// `YYYYMMDDhhmmss[-<ordinal>]`, UTC.
fn parse_oplog_ts(s: &str) -> Option<OplogTs> {
    let (clock, ordinal) = match s.split_once('-') {
        Some((c, i)) => (c, Some(i)),
        None => (s, None),
    };
    let t = NaiveDateTime::parse_from_str(clock, TS_FORMAT).ok()?;
    let t = u32::try_from(t.and_utc().timestamp()).ok()?;
    let i = match ordinal {
        Some(i) => i.parse::<u32>().ok()?,
        None => 0,
    };
    Some(OplogTs { t, i })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_compressed_chunk() {
        let chunk = chunk_from_fname("rs0/20240102/20240102030405-3.20240102031405-7.oplog.gz", 512).unwrap();
        assert_eq!(chunk.rs, "rs0");
        assert_eq!(chunk.fname, "pbmPitr/rs0/20240102/20240102030405-3.20240102031405-7.oplog.gz");
        assert_eq!(chunk.compression, Compression::Gzip);
        assert_eq!(chunk.start_ts, OplogTs { t: 1_704_164_645, i: 3 });
        assert_eq!(chunk.end_ts, OplogTs { t: 1_704_165_245, i: 7 });
        assert_eq!(chunk.size, 512);
    }

    #[test]
    fn ordinal_is_optional_and_compression_defaults_to_none() {
        let chunk = chunk_from_fname("cfg/20240102/20240102030405.20240102031405.oplog", 1).unwrap();
        assert_eq!(chunk.compression, Compression::None);
        assert_eq!(chunk.start_ts.i, 0);
    }

    #[test]
    fn junk_names_do_not_decode() {
        for name in [
            "20240102030405.20240102031405.oplog",
            "rs0/20240102/20240102030405.20240102031405.bson",
            "rs0/20240102/notatime.20240102031405.oplog",
            "rs0/20240102/20240102030405-x.20240102031405.oplog",
            "rs0/20240102/20240102030405.20240102031405.oplog.rar",
            "rs0/20240102/20240102030405.oplog",
            "rs0/20240102030405.20240102031405.oplog",
            "rs0/a/b/20240102030405.20240102031405.oplog",
            "rs0/2024012/20240102030405.20240102031405.oplog",
            "rs0/2024o102/20240102030405.20240102031405.oplog",
        ] {
            assert!(chunk_from_fname(name, 1).is_none(), "{name}");
        }
    }
}
