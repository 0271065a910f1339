use crate::command::{parse_markref, Command};
use crate::error::{Error, Result};
use crate::stream;

/// Move every path in the stream under the `name/` subdirectory.
///
/// The `.gitmodules` manifest is the exception: its path stays put and the
/// referenced blob payload is rewritten instead, prefixing every
/// `path = ` value so submodules land inside the subdirectory too. Returns
/// whether such a manifest rewrite occurred, so the caller can reject
/// a second input that also carries submodules.
pub fn move_to_subdir(cmds: &mut [Command], name: &[u8]) -> Result<bool> {
    let mut prefix = name.to_vec();
    if !prefix.ends_with(b"/") {
        prefix.push(b'/');
    }

    let blob_index = stream::index_blobs(cmds)?;
    let mut found_gitmodules = false;
    let mut manifest_rewrites: Vec<usize> = Vec::new();

    for cmd in cmds.iter_mut() {
        match cmd {
            Command::FileModify { dataref, path, .. } => {
                if path.as_slice() == b".gitmodules" {
                    let mark = parse_markref(dataref).ok_or_else(|| {
                        Error::MalformedStream(
                            ".gitmodules filemodify without a blob mark".to_string(),
                        )
                    })?;
                    let idx = *blob_index
                        .get(&mark)
                        .ok_or(Error::DanglingMarkReference(mark))?;
                    manifest_rewrites.push(idx);
                    found_gitmodules = true;
                } else {
                    *path = prefix_path(&prefix, path);
                }
            }
            Command::FileDelete { path } => {
                if path.as_slice() == b".gitmodules" {
                    found_gitmodules = true;
                } else {
                    *path = prefix_path(&prefix, path);
                }
            }
            Command::FileCopy { ops } | Command::FileRename { ops } => {
                *ops = prefix_copy_ops(&prefix, ops)?;
            }
            _ => {}
        }
    }

    for idx in manifest_rewrites {
        if let Command::Data { payload, .. } = &mut cmds[idx] {
            *payload = prefix_gitmodules(&prefix, payload);
        }
    }
    Ok(found_gitmodules)
}

/// Prefix a single path operand, keeping C-style quoting intact:
/// `"a b"` becomes `"sub/a b"`.
fn prefix_path(prefix: &[u8], path: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + path.len() + 1);
    if path.first() == Some(&b'"') {
        out.push(b'"');
        out.extend_from_slice(prefix);
        out.extend_from_slice(&path[1..]);
    } else {
        out.extend_from_slice(prefix);
        out.extend_from_slice(path);
    }
    out
}

fn prefix_copy_ops(prefix: &[u8], ops: &[u8]) -> Result<Vec<u8>> {
    let (src, dst) = split_copy_ops(ops)?;
    if dst.first() == Some(&b'"') && dst.windows(2).any(|w| w == b"\\\"") {
        return Err(Error::UnsupportedPathQuoting(
            String::from_utf8_lossy(dst).into_owned(),
        ));
    }
    let mut out = prefix_path(prefix, src);
    out.push(b' ');
    out.extend_from_slice(&prefix_path(prefix, dst));
    Ok(out)
}

fn split_copy_ops(ops: &[u8]) -> Result<(&[u8], &[u8])> {
    let src_end = if ops.first() == Some(&b'"') {
        let close = ops
            .iter()
            .skip(1)
            .position(|&b| b == b'"')
            .map(|off| off + 1)
            .ok_or_else(|| {
                Error::MalformedStream(format!(
                    "unterminated quoted path: {}",
                    String::from_utf8_lossy(ops)
                ))
            })?;
        if ops[close - 1] == b'\\' {
            return Err(Error::UnsupportedPathQuoting(
                String::from_utf8_lossy(ops).into_owned(),
            ));
        }
        close + 1
    } else {
        ops.iter().position(|&b| b == b' ').ok_or_else(|| {
            Error::MalformedStream(format!(
                "filecopy missing destination: {}",
                String::from_utf8_lossy(ops)
            ))
        })?
    };
    let src = &ops[..src_end];
    let dst = ops[src_end..].strip_prefix(b" ".as_ref()).ok_or_else(|| {
        Error::MalformedStream(format!(
            "filecopy missing destination: {}",
            String::from_utf8_lossy(ops)
        ))
    })?;
    Ok((src, dst))
}

fn prefix_gitmodules(prefix: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + prefix.len() * 4);
    for line in payload.split_inclusive(|&b| b == b'\n') {
        let indent_end = line
            .iter()
            .position(|&b| b != b' ' && b != b'\t')
            .unwrap_or(line.len());
        let body = &line[indent_end..];
        if let Some(value) = body.strip_prefix(b"path = ".as_ref()) {
            out.extend_from_slice(&line[..indent_end]);
            out.extend_from_slice(b"path = ");
            out.extend_from_slice(prefix);
            out.extend_from_slice(value);
        } else {
            out.extend_from_slice(line);
        }
    }
    out
}

/// Strip C-style quoting from a fast-export path, unescaping `\\` `\"`
/// `\n` `\t` `\r` and octal escapes. Unquoted paths come back as-is.
pub fn dequote_path(path: &[u8]) -> Vec<u8> {
    let inner = match (path.first(), path.last()) {
        (Some(b'"'), Some(b'"')) if path.len() >= 2 => &path[1..path.len() - 1],
        _ => return path.to_vec(),
    };
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0usize;
    while i < inner.len() {
        let b = inner[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let Some(&c) = inner.get(i) else {
            out.push(b'\\');
            break;
        };
        i += 1;
        match c {
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'0'..=b'7' => {
                let mut val: u32 = (c - b'0') as u32;
                let mut count = 0;
                while count < 2 && i < inner.len() && (b'0'..=b'7').contains(&inner[i]) {
                    val = (val << 3) | (inner[i] - b'0') as u32;
                    i += 1;
                    count += 1;
                }
                out.push(val as u8);
            }
            other => out.push(other),
        }
    }
    out
}
