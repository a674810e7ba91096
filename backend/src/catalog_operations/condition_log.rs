//! Decoding of restore marker files.
//!
//! Every agent reports progress by writing a write-once object under the
//! restore directory. The object name says *who* reports and *what* status,
//! the content says *when*:
//!
//! ```text
//! cluster.<status>                    cluster level
//! rs.<replset>/rs.<status>            replica set level
//! rs.<replset>/node.<node>.<status>   node level (node may contain dots)
//! ```
//!
//! Content is a decimal unix timestamp, or `<timestamp>:<message>` for the
//! `error` status. The `hb` status is a heartbeat and is not a condition.

use anyhow::{anyhow, Context, Result};

use super::types::{Condition, Status};

/// Which entity a marker file talks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Cluster,
    Replset(String),
    Node { replset: String, node: String },
}

/// Structured form of a marker file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerAddress {
    pub scope: Scope,
    pub status: Status,
}

impl MarkerAddress {
    /// Classifies a file name relative to the restore directory.
    /// Returns `None` for names that do not follow the marker layout.
    pub fn parse(fname: &str) -> Option<Self> {
        let (head, rest) = fname.split_once('.')?;
        let status = Status::from(fname.rsplit('.').next()?);

        let scope = match head {
            "cluster" => Scope::Cluster,
            "rs" => {
                let (replset, file) = rest.split_once('/')?;
                let parts: Vec<&str> = file.split('.').collect();
                if parts.len() < 2 {
                    return None;
                }
                match parts[0] {
                    "rs" => Scope::Replset(replset.to_string()),
                    "node" if parts.len() >= 3 => Scope::Node {
                        replset: replset.to_string(),
                        node: parts[1..parts.len() - 1].join("."),
                    },
                    _ => return None,
                }
            }
            _ => return None,
        };

        Some(Self { scope, status })
    }
}

/// One decoded marker file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerEvent {
    Condition(Condition),
    Heartbeat(i64),
}

/// Decodes the content of a marker file whose name carried `status`.
/// `fname` is only used to label errors.
pub fn parse_marker(fname: &str, status: Status, content: &[u8]) -> Result<MarkerEvent> {
    let text = std::str::from_utf8(content)
        .with_context(|| format!("marker {fname} is not valid utf-8"))?;

    match status {
        Status::Heartbeat => Ok(MarkerEvent::Heartbeat(parse_ts(fname, text)?)),
        Status::Error => {
            let (ts, msg) = text
                .split_once(':')
                .ok_or_else(|| anyhow!("malformed data in {fname}: {text}"))?;
            Ok(MarkerEvent::Condition(Condition {
                timestamp: parse_ts(fname, ts)?,
                status,
                error: Some(msg.to_string()),
            }))
        }
        status => Ok(MarkerEvent::Condition(Condition {
            timestamp: parse_ts(fname, text)?,
            status,
            error: None,
        })),
    }
}

fn parse_ts(fname: &str, s: &str) -> Result<i64> {
    s.parse::<i64>()
        .with_context(|| format!("read ts from {fname}: {s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_cluster_replset_and_node_files() {
        assert_eq!(
            MarkerAddress::parse("cluster.running"),
            Some(MarkerAddress { scope: Scope::Cluster, status: Status::Running })
        );
        assert_eq!(
            MarkerAddress::parse("rs.shard0/rs.done"),
            Some(MarkerAddress { scope: Scope::Replset("shard0".into()), status: Status::Done })
        );
        assert_eq!(
            MarkerAddress::parse("rs.shard0/node.n1.error"),
            Some(MarkerAddress {
                scope: Scope::Node { replset: "shard0".into(), node: "n1".into() },
                status: Status::Error,
            })
        );
    }

    #[test]
    fn node_names_keep_inner_dots() {
        let addr = MarkerAddress::parse("rs.rs1/node.db-1.example.com:27017.hb").unwrap();
        assert_eq!(
            addr.scope,
            Scope::Node { replset: "rs1".into(), node: "db-1.example.com:27017".into() }
        );
        assert_eq!(addr.status, Status::Heartbeat);
    }

    #[test]
    fn unclassifiable_names_are_rejected() {
        for name in ["cluster", "rs.shard0", "rs.shard0/rs", "rs.shard0/node.hb", "foo.done", "rs.x/other.done"] {
            assert_eq!(MarkerAddress::parse(name), None, "{name}");
        }
    }

    #[test]
    fn error_content_splits_on_first_colon() {
        let ev = parse_marker("cluster.error", Status::Error, b"100:disk full").unwrap();
        assert_eq!(
            ev,
            MarkerEvent::Condition(Condition {
                timestamp: 100,
                status: Status::Error,
                error: Some("disk full".into()),
            })
        );

        let ev = parse_marker("cluster.error", Status::Error, b"7:dial tcp: refused").unwrap();
        let MarkerEvent::Condition(c) = ev else { panic!("expected condition") };
        assert_eq!(c.error.as_deref(), Some("dial tcp: refused"));
    }

    #[test]
    fn error_content_without_colon_is_rejected() {
        let err = parse_marker("rs.a/rs.error", Status::Error, b"100").unwrap_err();
        assert!(err.to_string().contains("rs.a/rs.error"));
    }

    #[test]
    fn plain_status_needs_bare_timestamp() {
        assert_eq!(
            parse_marker("cluster.done", Status::Done, b"42").unwrap(),
            MarkerEvent::Condition(Condition { timestamp: 42, status: Status::Done, error: None })
        );
        assert!(parse_marker("cluster.done", Status::Done, b"42\n").is_err());
        assert!(parse_marker("cluster.done", Status::Done, b"soon").is_err());
        assert!(parse_marker("cluster.done", Status::Done, b"").is_err());
    }

    #[test]
    fn heartbeat_is_not_a_condition() {
        assert_eq!(
            parse_marker("cluster.hb", Status::Heartbeat, b"1700000000").unwrap(),
            MarkerEvent::Heartbeat(1_700_000_000)
        );
    }
}
