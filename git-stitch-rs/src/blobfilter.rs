use std::collections::HashSet;
use std::io::{self, Write};
use std::process::{Command as HostCommand, Stdio};
use std::thread;

use rayon::prelude::*;

use crate::command::{parse_markref, Command};
use crate::error::{Error, Result};
use crate::paths::dequote_path;
use crate::progress::Progress;
use crate::stream;

/// Configuration for the external blob filter pipeline.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Command template; `%f` is replaced with the blob's file name. The
    /// filter reads the original payload on stdin and writes the
    /// replacement to stdout.
    pub command: String,
    /// Lowercase extensions without the dot; empty matches every path.
    pub extensions: Vec<String>,
    /// Blobs larger than this bypass the filter unchanged.
    pub size_limit: usize,
    pub quiet: bool,
}

/// Run the configured external filter over every blob that a kept
/// filemodify references under a matching name.
pub fn run(cmds: &mut [Command], cfg: &FilterConfig) -> Result<()> {
    filter_blobs(
        cmds,
        |path| name_matches(&cfg.extensions, path),
        |path, payload| external_filter(&cfg.command, cfg.size_limit, path, payload),
        cfg.quiet,
    )
}

/// The driver itself, generic over the selection predicate and the worker.
///
/// Blobs are located through the mark index, deduplicated so each unique
/// blob is filtered once no matter how many filemodifies reference it, and
/// dispatched to a pool of parallel workers. Payloads are detached from the
/// sequence before dispatch, bounding peak memory to roughly the stream
/// size plus the in-flight filter payloads. Results are spliced back by
/// index, so the output order never depends on worker completion order.
pub fn filter_blobs<F, W>(
    cmds: &mut [Command],
    name_filter: F,
    blob_filter: W,
    quiet: bool,
) -> Result<()>
where
    F: Fn(&[u8]) -> bool,
    W: Fn(&[u8], Vec<u8>) -> Result<Vec<u8>> + Sync,
{
    let blob_index = stream::index_blobs(cmds)?;
    let mut scheduled: HashSet<usize> = HashSet::new();
    let mut jobs: Vec<(usize, Vec<u8>)> = Vec::new();
    for cmd in cmds.iter() {
        let Command::FileModify { dataref, path, .. } = cmd else {
            continue;
        };
        let Some(mark) = parse_markref(dataref) else {
            continue;
        };
        let name = dequote_path(path);
        if !name_filter(&name) {
            continue;
        }
        let idx = *blob_index
            .get(&mark)
            .ok_or(Error::DanglingMarkReference(mark))?;
        if scheduled.insert(idx) {
            jobs.push((idx, name));
        }
    }

    let mut work = Vec::with_capacity(jobs.len());
    for (idx, name) in jobs {
        if let Command::Data { payload, .. } = &mut cmds[idx] {
            work.push((idx, name, std::mem::take(payload)));
        }
    }

    let progress = Progress::new(work.len(), quiet);
    let results = work
        .into_par_iter()
        .map(|(idx, name, payload)| {
            let filtered = blob_filter(&name, payload)?;
            progress.tick();
            Ok((idx, filtered))
        })
        .collect::<Result<Vec<_>>>();
    progress.finish();

    for (idx, payload) in results? {
        if let Command::Data { payload: slot, .. } = &mut cmds[idx] {
            *slot = payload;
        }
    }
    Ok(())
}

/// Case-insensitive suffix match on a dotted extension. An empty extension
/// list matches every path.
pub fn name_matches(extensions: &[String], path: &[u8]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let lower: Vec<u8> = path.iter().map(|b| b.to_ascii_lowercase()).collect();
    extensions.iter().any(|ext| {
        let ext = ext.as_bytes();
        lower.len() > ext.len()
            && lower.ends_with(ext)
            && lower[lower.len() - ext.len() - 1] == b'.'
    })
}

/// Invoke the external filter command on one blob. Oversized blobs pass
/// through unchanged. A non-zero exit is a fatal worker error.
pub fn external_filter(
    template: &str,
    size_limit: usize,
    path: &[u8],
    payload: Vec<u8>,
) -> Result<Vec<u8>> {
    if payload.len() > size_limit {
        return Ok(payload);
    }
    let name = String::from_utf8_lossy(path).into_owned();
    let argv = split_command(&template.replace("%f", &name))?;
    let Some((program, args)) = argv.split_first() else {
        return Err(Error::Usage("empty blob filter command".to_string()));
    };

    let failed = |detail: String| Error::HostToolFailed {
        command: template.to_string(),
        detail,
    };
    let mut child = HostCommand::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| failed(format!("failed to start: {e}")))?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| failed("no stdin handle".to_string()))?;
    let writer = thread::spawn(move || {
        let res = stdin.write_all(&payload);
        drop(stdin);
        res
    });
    let output = child.wait_with_output()?;
    let write_res = writer
        .join()
        .map_err(|_| failed("stdin writer panicked".to_string()))?;
    if let Err(e) = write_res {
        // A filter that does not consume all of its input is fine as long
        // as it exits successfully.
        if e.kind() != io::ErrorKind::BrokenPipe {
            return Err(Error::Io(e));
        }
    }
    if !output.status.success() {
        return Err(failed(format!("exited with {}", output.status)));
    }
    Ok(output.stdout)
}

/// Split a command template into argv words, honoring single and double
/// quotes.
pub fn split_command(s: &str) -> Result<Vec<String>> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        argv.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                other => {
                    current.push(other);
                    in_word = true;
                }
            },
        }
    }
    if quote.is_some() {
        return Err(Error::Usage(format!(
            "unbalanced quote in filter command: {}",
            s
        )));
    }
    if in_word {
        argv.push(current);
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{parse, serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn three_blob_stream() -> Vec<u8> {
        b"blob\nmark :1\ndata 5\naaaaa\nblob\nmark :2\ndata 20\nbbbbbbbbbbbbbbbbbbbb\nblob\nmark :3\ndata 5\nccccc\ncommit refs/heads/master\nmark :4\ncommitter T <t@e> 1 +0000\ndata 2\nm\nM 100644 :1 small.c\nM 100644 :2 large.c\nM 100644 :3 other.h\n"
            .to_vec()
    }

    #[test]
    fn extension_list_and_size_limit_select_blobs() {
        let mut cmds = parse(&three_blob_stream()).unwrap();
        let exts = vec!["c".to_string()];
        filter_blobs(
            &mut cmds,
            |path| name_matches(&exts, path),
            |_, payload| {
                if payload.len() > 10 {
                    Ok(payload)
                } else {
                    Ok(payload.iter().map(u8::to_ascii_uppercase).collect())
                }
            },
            true,
        )
        .unwrap();
        let text = serialize(&cmds);
        let text = String::from_utf8_lossy(&text);
        assert!(text.contains("data 5\nAAAAA\n"));
        assert!(text.contains("data 20\nbbbbbbbbbbbbbbbbbbbb\n"));
        assert!(text.contains("data 5\nccccc\n"));
    }

    #[test]
    fn identity_filter_is_bit_exact() {
        let input = three_blob_stream();
        let mut cmds = parse(&input).unwrap();
        filter_blobs(&mut cmds, |_| true, |_, payload| Ok(payload), true).unwrap();
        assert_eq!(serialize(&cmds), input);
    }

    #[test]
    fn each_unique_blob_is_filtered_once() {
        let stream: &[u8] = b"blob\nmark :1\ndata 3\nabc\ncommit refs/heads/master\nmark :2\ncommitter T <t@e> 1 +0000\ndata 2\nm\nM 100644 :1 a.c\ncommit refs/heads/master\nmark :3\ncommitter T <t@e> 2 +0000\ndata 2\nm\nfrom :2\nM 100644 :1 b.c\n";
        let mut cmds = parse(stream).unwrap();
        let calls = AtomicUsize::new(0);
        filter_blobs(
            &mut cmds,
            |_| true,
            |_, payload| {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(payload)
            },
            true,
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn filemodify_referencing_an_unknown_mark_is_rejected() {
        let stream: &[u8] = b"commit refs/heads/master\nmark :2\ncommitter T <t@e> 1 +0000\ndata 2\nm\nM 100644 :9 f.c\n";
        let mut cmds = parse(stream).unwrap();
        let err = filter_blobs(&mut cmds, |_| true, |_, p| Ok(p), true).unwrap_err();
        assert!(matches!(err, Error::DanglingMarkReference(9)));
    }

    #[test]
    fn worker_errors_abort_the_pipeline() {
        let mut cmds = parse(&three_blob_stream()).unwrap();
        let err = filter_blobs(
            &mut cmds,
            |_| true,
            |path, _| {
                Err(Error::HostToolFailed {
                    command: "boom".to_string(),
                    detail: String::from_utf8_lossy(path).into_owned(),
                })
            },
            true,
        )
        .unwrap_err();
        assert!(matches!(err, Error::HostToolFailed { .. }));
    }

    #[test]
    fn name_matching_is_case_insensitive_and_dotted() {
        let exts = vec!["c".to_string(), "hpp".to_string()];
        assert!(name_matches(&exts, b"src/main.c"));
        assert!(name_matches(&exts, b"SRC/MAIN.C"));
        assert!(name_matches(&exts, b"inc/a.HPP"));
        assert!(!name_matches(&exts, b"mainc"));
        assert!(!name_matches(&exts, b"main.cc"));
        assert!(name_matches(&[], b"anything.bin"));
    }

    #[test]
    fn command_templates_split_on_words_and_quotes() {
        assert_eq!(
            split_command("sed -e 's/a b/c/' x.c").unwrap(),
            vec!["sed", "-e", "s/a b/c/", "x.c"]
        );
        assert_eq!(split_command("  cat  ").unwrap(), vec!["cat"]);
        assert!(matches!(
            split_command("sed 'unterminated"),
            Err(Error::Usage(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn external_filter_pipes_payload_through_the_command() {
        let out = external_filter("tr a-z A-Z", 100, b"f.c", b"hello".to_vec()).unwrap();
        assert_eq!(out, b"HELLO");
        // Oversized payloads bypass the command entirely.
        let big = vec![b'x'; 200];
        let out = external_filter("definitely-not-a-command", 100, b"f.c", big.clone()).unwrap();
        assert_eq!(out, big);
        assert!(matches!(
            external_filter("false", 100, b"f.c", b"hello".to_vec()),
            Err(Error::HostToolFailed { .. })
        ));
    }
}
