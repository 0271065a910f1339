use crate::command::Command;

/// Rewrite `refs/remotes/origin/X` to `refs/heads/X` on every `commit`,
/// `reset` and `tag` command. Running it twice is a no-op.
pub fn canonicalize(cmds: &mut [Command]) {
    for_each_ref(cmds, |refname| {
        if let Some(rest) = refname.strip_prefix(b"refs/remotes/origin/".as_ref()) {
            let mut rebuilt = Vec::with_capacity(b"refs/heads/".len() + rest.len());
            rebuilt.extend_from_slice(b"refs/heads/");
            rebuilt.extend_from_slice(rest);
            *refname = rebuilt;
        }
    });
}

/// Append `suffix` to every ref and tag name so two streams' refs do not
/// collide when concatenated. Refs already carrying the suffix are left
/// alone, keeping the pass idempotent at the stream level.
pub fn append_suffix(cmds: &mut [Command], suffix: &[u8]) {
    if suffix.is_empty() {
        return;
    }
    for_each_ref(cmds, |refname| {
        if !refname.ends_with(suffix) {
            refname.extend_from_slice(suffix);
        }
    });
}

fn for_each_ref(cmds: &mut [Command], mut rewrite: impl FnMut(&mut Vec<u8>)) {
    for cmd in cmds.iter_mut() {
        match cmd {
            Command::Commit(refname) | Command::Reset(refname) | Command::Tag(refname) => {
                rewrite(refname)
            }
            _ => {}
        }
    }
}
