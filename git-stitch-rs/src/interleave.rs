use std::collections::HashMap;

use crate::branchlog::{self, LogEntry};
use crate::command::{markref_bytes, parse_markref, Command};
use crate::error::{Error, Result};
use crate::marks;
use crate::refs;

/// Merge two branch logs into one, ordered by committer time.
///
/// This is a stable two-cursor interleave rather than a sort: when either
/// history's own committer times are non-monotonic, a plain sort would
/// reorder commits within that history. Ties go to the main side.
pub fn combine_logs(main_log: Vec<LogEntry>, sec_log: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut log = Vec::with_capacity(main_log.len() + sec_log.len());
    let mut i = 0usize;
    let mut j = 0usize;
    while i < main_log.len() && j < sec_log.len() {
        if main_log[i].time <= sec_log[j].time {
            log.push(main_log[i]);
            i += 1;
        } else {
            log.push(sec_log[j]);
            j += 1;
        }
    }
    log.extend_from_slice(&main_log[i..]);
    log.extend_from_slice(&sec_log[j..]);
    log
}

/// Interleave two exported histories into a single command sequence whose
/// commits are globally ordered by committer time.
///
/// Secondary marks are renumbered past the main stream's mark space and
/// secondary refs get a `-<name>` suffix, so the two histories coexist as
/// parallel first-parent chains. At every switch between histories the
/// first commit of the incoming run is attached to the latest emitted
/// commit of the other history: either by rewriting its `from` through
/// `mark_map`, or, for the very first commit of a stream, by synthesizing
/// a `from` it never had.
pub fn merge(
    main_cmds: Vec<Command>,
    mut sec_cmds: Vec<Command>,
    main_branch: &[u8],
    sec_branch: &[u8],
    sec_name: &[u8],
) -> Result<Vec<Command>> {
    marks::renumber(&mut sec_cmds, marks::max_mark(&main_cmds));

    // Logs must be taken before the refs are renamed.
    let main_log = branchlog::extract(&main_cmds, main_branch, 0)?;
    let sec_log = branchlog::extract(&sec_cmds, sec_branch, 1)?;
    let log = combine_logs(main_log, sec_log);

    refs::canonicalize(&mut sec_cmds);
    let mut suffix = Vec::with_capacity(sec_name.len() + 1);
    suffix.push(b'-');
    suffix.extend_from_slice(sec_name);
    refs::append_suffix(&mut sec_cmds, &suffix);

    let sources = [main_cmds, sec_cmds];
    let mut cursor = [0usize; 2];
    let mut out: Vec<Command> = Vec::with_capacity(sources[0].len() + sources[1].len());
    let mut mark_map: HashMap<u32, u32> = HashMap::new();
    let mut log_idx = 0usize;
    let mut last_branch: Option<u8> = None;
    let mut mark_before_break: Option<u32> = None;
    let mut mark_from_prev: Option<u32> = None;

    while cursor[0] < sources[0].len() || cursor[1] < sources[1].len() {
        // Pick the next run: the log names the branch and the mark that ends
        // it; once the log is exhausted, drain whatever is left.
        let (branch_id, breakpoint) = match log.get(log_idx) {
            Some(entry) => {
                log_idx += 1;
                (entry.id, Some(entry.mark))
            }
            None => {
                let id = if cursor[0] < sources[0].len() { 0u8 } else { 1u8 };
                (id, None)
            }
        };

        if let (Some(brk), Some(last)) = (mark_before_break, last_branch) {
            if last != branch_id {
                if let Some(prev) = mark_from_prev {
                    mark_map.insert(prev, brk);
                }
                mark_from_prev = Some(brk);
            }
        }

        let src = &sources[branch_id as usize];
        let idx = &mut cursor[branch_id as usize];
        let first_commit_of_branch = *idx == 0;
        mark_before_break = None;
        let mut expecting_tag_from = false;
        let mut processed_all = true;

        let mut k = *idx;
        while k < src.len() {
            let brk = match (&src[k], breakpoint) {
                (Command::Mark(m), Some(b)) if *m == b => Some(b),
                _ => None,
            };
            let Some(brk) = brk else {
                // A `from` directly after `tag` targets a commit in the same
                // stream; remapping it would misdirect the tag.
                if expecting_tag_from {
                    out.push(src[k].clone());
                    expecting_tag_from = false;
                } else {
                    out.push(remap_from(src[k].clone(), &mark_map));
                }
                if matches!(src[k], Command::Tag(_)) {
                    expecting_tag_from = true;
                }
                k += 1;
                continue;
            };

            if k == 0 || !matches!(src[k - 1], Command::Commit(_)) {
                return Err(Error::MissingCommitBeforeMark(brk));
            }
            let reparent = if first_commit_of_branch {
                mark_from_prev
            } else {
                None
            };

            // Emit the rest of this commit entry, stopping at the first
            // command that cannot belong to it.
            let mut inserted = false;
            let mut i = k;
            while i < src.len() {
                let cmd = &src[i];
                if !cmd.is_commit_tail() {
                    *idx = i;
                    processed_all = false;
                    break;
                }
                if reparent.is_some() && matches!(cmd, Command::From(_)) {
                    return Err(Error::UnexpectedFrom);
                }
                out.push(remap_from(cmd.clone(), &mark_map));
                if let Some(parent) = reparent {
                    if !inserted && matches!(cmd, Command::Data { .. }) {
                        out.push(Command::From(markref_bytes(parent)));
                        inserted = true;
                    }
                }
                i += 1;
            }
            mark_before_break = Some(brk);
            break;
        }

        if processed_all {
            *idx = src.len();
        }
        last_branch = Some(branch_id);
    }

    Ok(out)
}

fn remap_from(cmd: Command, mark_map: &HashMap<u32, u32>) -> Command {
    if let Command::From(target) = &cmd {
        if let Some(mark) = parse_markref(target) {
            if let Some(&new) = mark_map.get(&mark) {
                return Command::From(markref_bytes(new));
            }
        }
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{parse, serialize};

    fn one_commit_stream(time: i64, file: &str) -> Vec<u8> {
        format!(
            "blob\nmark :1\ndata 1\na\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> {} +0000\ndata 2\nc1\nM 100644 :1 {}\n",
            time, file
        )
        .into_bytes()
    }

    #[test]
    fn older_secondary_commit_goes_first_and_newer_main_is_reattached() {
        let main = parse(&one_commit_stream(200, "m.txt")).unwrap();
        let sec = parse(&one_commit_stream(100, "s.txt")).unwrap();
        let merged = merge(main, sec, b"master", b"master", b"other").unwrap();
        let text = serialize(&merged);
        let text = String::from_utf8_lossy(&text);

        let sec_commit = text.find("commit refs/heads/master-other\n").unwrap();
        let main_commit = text.find("commit refs/heads/master\nmark :2\n").unwrap();
        assert!(sec_commit < main_commit);
        // Secondary marks were renumbered past the main stream's space.
        assert!(text.contains("mark :4"));
        // The main commit, naturally orphan, was attached to the secondary
        // tip emitted before it.
        assert!(text.contains("data 2\nc1\nfrom :4\n"));
    }

    #[test]
    fn runs_alternate_by_time_and_cross_history_parents_are_remapped() {
        let main: &[u8] = b"blob\nmark :1\ndata 1\na\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 100 +0000\ndata 2\nc1\nM 100644 :1 f\ncommit refs/heads/master\nmark :3\ncommitter T <t@e> 300 +0000\ndata 2\nc2\nfrom :2\nM 100644 :1 g\n";
        let sec: &[u8] = b"blob\nmark :1\ndata 1\nb\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 200 +0000\ndata 2\ns1\nM 100644 :1 s\n";
        let merged = merge(
            parse(main).unwrap(),
            parse(sec).unwrap(),
            b"master",
            b"master",
            b"lib",
        )
        .unwrap();
        let text = serialize(&merged);
        let text = String::from_utf8_lossy(&text);

        let m1 = text.find("mark :2\n").unwrap();
        let s1 = text.find("mark :5\n").unwrap();
        let m2 = text.find("mark :3\n").unwrap();
        assert!(m1 < s1 && s1 < m2);
        // The secondary's first commit was attached to main's first commit,
        // and main's second commit follows the secondary tip.
        assert!(text.contains("data 2\ns1\nfrom :2\n"));
        assert!(text.contains("data 2\nc2\nfrom :5\n"));
    }

    #[test]
    fn merging_identical_streams_doubles_the_commit_count() {
        let stream: &[u8] = b"blob\nmark :1\ndata 1\na\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 100 +0000\ndata 2\nc1\nM 100644 :1 f\ncommit refs/heads/master\nmark :3\ncommitter T <t@e> 200 +0000\ndata 2\nc2\nfrom :2\nM 100644 :1 g\n";
        let cmds = parse(stream).unwrap();
        let input_commits = cmds
            .iter()
            .filter(|c| matches!(c, Command::Commit(_)))
            .count();
        let merged = merge(cmds.clone(), cmds, b"master", b"master", b"twin").unwrap();
        let merged_commits = merged
            .iter()
            .filter(|c| matches!(c, Command::Commit(_)))
            .count();
        assert_eq!(merged_commits, input_commits * 2);
    }

    #[test]
    fn tag_from_is_never_remapped() {
        let main: &[u8] = b"blob\nmark :1\ndata 1\na\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 100 +0000\ndata 2\nc1\nM 100644 :1 f\ntag v1\nfrom :2\ntagger T <t@e> 100 +0000\ndata 3\ntag\n";
        let sec = one_commit_stream(200, "s.txt");
        let merged = merge(
            parse(main).unwrap(),
            parse(&sec).unwrap(),
            b"master",
            b"master",
            b"other",
        )
        .unwrap();
        let text = serialize(&merged);
        let text = String::from_utf8_lossy(&text);
        // mark_map holds 2 -> 4 by the time the tag drains, but the tag's
        // target lives in its own stream.
        assert!(text.contains("tag v1\nfrom :2\ntagger"));
    }

    #[test]
    fn reparented_first_commit_must_be_orphan() {
        let main: &[u8] = b"blob\nmark :1\ndata 1\na\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 200 +0000\ndata 2\nc1\nfrom :9\n";
        let sec = one_commit_stream(100, "s.txt");
        let err = merge(
            parse(main).unwrap(),
            parse(&sec).unwrap(),
            b"master",
            b"master",
            b"other",
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnexpectedFrom));
    }

    #[test]
    fn breakpoint_mark_not_preceded_by_commit_is_rejected() {
        // The blob reuses the commit's mark number, so the emission pass
        // finds the breakpoint on a blob entry first.
        let main: &[u8] = b"blob\nmark :2\ndata 1\na\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 100 +0000\ndata 2\nc1\nM 100644 :2 f\n";
        let sec = one_commit_stream(200, "s.txt");
        let err = merge(
            parse(main).unwrap(),
            parse(&sec).unwrap(),
            b"master",
            b"master",
            b"other",
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingCommitBeforeMark(2)));
    }
}
