use crate::command::{parse_markref, Command};
use crate::error::{Error, Result};

/// One commit on the first-parent chain of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub mark: u32,
    /// Committer time in raw unix seconds. The timezone offset is ignored
    /// on purpose: the interleaver needs a total order that is stable to
    /// the second, and timezone normalization reorders adjacent commits
    /// across DST boundaries.
    pub time: i64,
    /// Numeric origin tag: 0 for the main history, 1 for the secondary.
    pub id: u8,
}

/// Extract the first-parent chain of `branch`, oldest commit first.
///
/// The stream is scanned backward: the branch tip is located either through
/// a `reset refs/heads/<branch>` followed by `from :N`, or directly through
/// the last `commit refs/heads/<branch>` entry. From there the chain follows
/// each commit's `from` mark until a parentless commit ends the walk.
/// Chain order is returned as-is; committer times are not required to be
/// monotonic.
pub fn extract(cmds: &[Command], branch: &[u8], id: u8) -> Result<Vec<LogEntry>> {
    let head_refs = [
        [b"refs/heads/".as_ref(), branch].concat(),
        [b"refs/heads/origin/".as_ref(), branch].concat(),
    ];

    let mut log: Vec<LogEntry> = Vec::new();
    let mut parent: Option<u32> = None;
    for k in (0..cmds.len()).rev() {
        match &cmds[k] {
            Command::Reset(refname) if log.is_empty() && parent.is_none() => {
                if !head_refs.iter().any(|r| r == refname) {
                    continue;
                }
                if let Some(Command::From(target)) = cmds.get(k + 1) {
                    parent = parse_markref(target);
                }
            }
            Command::Commit(refname) if log.is_empty() && parent.is_none() => {
                if !head_refs.iter().any(|r| r == refname) {
                    continue;
                }
                let (entry, next_parent) = read_commit_entry(cmds, k, id)?;
                log.push(entry);
                match next_parent {
                    Some(p) => parent = Some(p),
                    None => break,
                }
            }
            Command::Commit(_) => {
                let Some(p) = parent else { continue };
                if !matches!(cmds.get(k + 1), Some(Command::Mark(m)) if *m == p) {
                    continue;
                }
                let (entry, next_parent) = read_commit_entry(cmds, k, id)?;
                log.push(entry);
                match next_parent {
                    Some(p) => parent = Some(p),
                    None => break,
                }
            }
            _ => {}
        }
    }

    log.reverse();
    Ok(log)
}

/// Read the mark, committer time, and first parent of the commit entry that
/// starts at `k`, tolerating the optional `original-oid` and `author` lines
/// before `committer`.
fn read_commit_entry(cmds: &[Command], k: usize, id: u8) -> Result<(LogEntry, Option<u32>)> {
    let mark = match cmds.get(k + 1) {
        Some(Command::Mark(m)) => *m,
        _ => {
            return Err(Error::MalformedStream(
                "commit entry without a mark".to_string(),
            ))
        }
    };
    let mut idx = k + 2;
    while matches!(
        cmds.get(idx),
        Some(Command::OriginalOid(_)) | Some(Command::Author(_))
    ) {
        idx += 1;
    }
    let time = match cmds.get(idx) {
        Some(Command::Committer(rest)) => committer_seconds(rest)?,
        _ => {
            return Err(Error::MalformedStream(format!(
                "commit :{} without a committer",
                mark
            )))
        }
    };
    // committer, data, then the optional from
    let parent = match cmds.get(idx + 2) {
        Some(Command::From(target)) => parse_markref(target),
        _ => None,
    };
    Ok((LogEntry { mark, time, id }, parent))
}

/// Pull the unix seconds out of a committer line tail:
/// `Name <email> <seconds> <tz>`.
fn committer_seconds(rest: &[u8]) -> Result<i64> {
    let bad = || {
        Error::MalformedStream(format!(
            "committer line without a timestamp: {}",
            String::from_utf8_lossy(rest)
        ))
    };
    let gt = rest.iter().rposition(|&b| b == b'>').ok_or_else(bad)?;
    let tail = rest[gt + 1..].strip_prefix(b" ".as_ref()).ok_or_else(bad)?;
    let end = tail
        .iter()
        .position(|&b| b == b' ')
        .unwrap_or(tail.len());
    let digits = std::str::from_utf8(&tail[..end]).map_err(|_| bad())?;
    digits.parse::<i64>().map_err(|_| bad())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parse;

    fn marks(log: &[LogEntry]) -> Vec<u32> {
        log.iter().map(|e| e.mark).collect()
    }

    #[test]
    fn chain_order_is_kept_even_when_times_are_not_monotonic() {
        let stream: &[u8] = b"commit refs/heads/master\nmark :1\ncommitter T <t@e> 10 +0000\ndata 2\nc1\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 30 +0000\ndata 2\nc2\nfrom :1\ncommit refs/heads/master\nmark :3\ncommitter T <t@e> 20 +0000\ndata 2\nc3\nfrom :2\n";
        let cmds = parse(stream).unwrap();
        let log = extract(&cmds, b"master", 0).unwrap();
        assert_eq!(marks(&log), vec![1, 2, 3]);
        assert_eq!(
            log.iter().map(|e| e.time).collect::<Vec<_>>(),
            vec![10, 30, 20]
        );
        assert!(log.iter().all(|e| e.id == 0));
    }

    #[test]
    fn tip_is_found_through_a_trailing_reset() {
        let stream: &[u8] = b"commit refs/heads/work\nmark :1\ncommitter T <t@e> 5 +0000\ndata 2\nc1\ncommit refs/heads/work\nmark :2\ncommitter T <t@e> 6 +0000\ndata 2\nc2\nfrom :1\nreset refs/heads/master\nfrom :2\n";
        let cmds = parse(stream).unwrap();
        let log = extract(&cmds, b"master", 1).unwrap();
        assert_eq!(marks(&log), vec![1, 2]);
        assert!(log.iter().all(|e| e.id == 1));
    }

    #[test]
    fn optional_original_oid_and_author_lines_are_skipped() {
        let stream: &[u8] = b"commit refs/heads/master\nmark :1\noriginal-oid 1234567890123456789012345678901234567890\nauthor A <a@b> 7 +0100\ncommitter C <c@d> 9 -0500\ndata 2\nc1\n";
        let cmds = parse(stream).unwrap();
        let log = extract(&cmds, b"master", 0).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].time, 9);
    }

    #[test]
    fn missing_branch_yields_an_empty_log() {
        let stream: &[u8] =
            b"commit refs/heads/other\nmark :1\ncommitter T <t@e> 5 +0000\ndata 2\nc1\n";
        let cmds = parse(stream).unwrap();
        let log = extract(&cmds, b"master", 0).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn origin_alias_of_the_branch_is_recognized() {
        let stream: &[u8] =
            b"commit refs/heads/origin/master\nmark :1\ncommitter T <t@e> 5 +0000\ndata 2\nc1\n";
        let cmds = parse(stream).unwrap();
        let log = extract(&cmds, b"master", 0).unwrap();
        assert_eq!(marks(&log), vec![1]);
    }
}
