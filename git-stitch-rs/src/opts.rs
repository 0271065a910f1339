use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_EXTENSIONS: &[&str] = &["c", "cpp", "cxx", "cc", "h", "hpp", "hxx", "hh"];
pub const DEFAULT_SIZE_LIMIT: usize = 200_000;
pub const DEFAULT_BRANCH: &str = "master";

const USAGE: &str = "usage: git-stitch-rs <command> [options]

Commands:
  join -o OUT [-n] [-q] MAIN SECONDARY...
      Stitch the histories of two or more repositories into OUT.
      A repository specification is path[,name][:branch], where name
      defaults to the last path component and branch to master.
      -n, --no-subdirs    do not move each repository under a subdirectory
      -o, --output OUT    output directory for the stitched repository
      -q, --quiet         suppress status output

  filter-blobs [-f EXTS] [-l LIMIT] [-b BRANCH] [-c CONFIG] [-q] INPUT OUTPUT FILTER
      Run FILTER over every matching blob in INPUT's history, writing the
      rewritten repository to OUTPUT. FILTER reads the original blob on
      stdin and prints the replacement on stdout; %f expands to the file
      name.
      -f, --file-filter EXTS  comma separated extension list
                              (default: c,cpp,cxx,cc,h,hpp,hxx,hh)
      -l, --size-limit LIMIT  do not filter blobs larger than LIMIT bytes
                              (default: 200000)
      -b, --branch BRANCH     branch to check out after import
                              (default: master)
      -c, --config FILE       TOML file with [filter] defaults
      -q, --quiet             suppress status output";

/// A repository specification: `path[,name][:branch]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub path: PathBuf,
    pub name: String,
    pub branch: String,
}

impl RepoSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let (rest, branch) = match spec.find(':') {
            Some(pos) => (&spec[..pos], spec[pos + 1..].to_string()),
            None => (spec, DEFAULT_BRANCH.to_string()),
        };
        let (path, name) = match rest.find(',') {
            Some(pos) => (&rest[..pos], rest[pos + 1..].to_string()),
            None => {
                let trimmed = rest.trim_end_matches('/');
                let name = Path::new(trimmed)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_string())
                    .ok_or_else(|| {
                        Error::Usage(format!(
                            "cannot derive a repository name from {:?}; use path,name",
                            spec
                        ))
                    })?;
                (rest, name)
            }
        };
        if path.is_empty() || name.is_empty() || branch.is_empty() {
            return Err(Error::Usage(format!(
                "bad repository specification {:?}; expected path[,name][:branch]",
                spec
            )));
        }
        Ok(RepoSpec {
            path: PathBuf::from(path),
            name,
            branch,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub output: PathBuf,
    pub main: RepoSpec,
    pub secondaries: Vec<RepoSpec>,
    pub subdirs: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct FilterBlobsOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub command: String,
    pub extensions: Vec<String>,
    pub size_limit: usize,
    pub branch: String,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub enum Options {
    Join(JoinOptions),
    FilterBlobs(FilterBlobsOptions),
}

pub fn parse_args() -> Result<Options> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_from(&args)
}

pub fn parse_from(args: &[String]) -> Result<Options> {
    let Some((sub, rest)) = args.split_first() else {
        return Err(Error::Usage(USAGE.to_string()));
    };
    match sub.as_str() {
        "join" => parse_join(rest),
        "filter-blobs" => parse_filter_blobs(rest),
        "help" | "-h" | "--help" => Err(Error::Usage(USAGE.to_string())),
        other => Err(Error::Usage(format!(
            "unknown command {:?}\n\n{}",
            other, USAGE
        ))),
    }
}

fn parse_join(args: &[String]) -> Result<Options> {
    let mut output: Option<PathBuf> = None;
    let mut subdirs = true;
    let mut quiet = false;
    let mut specs: Vec<RepoSpec> = Vec::new();

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-n" | "--no-subdirs" => subdirs = false,
            "-q" | "--quiet" => quiet = true,
            "-o" | "--output" => {
                let value = it
                    .next()
                    .ok_or_else(|| Error::Usage("--output requires a value".to_string()))?;
                output = Some(PathBuf::from(value));
            }
            s if s.starts_with('-') => {
                return Err(Error::Usage(format!("unknown join option {:?}", s)))
            }
            s => specs.push(RepoSpec::parse(s)?),
        }
    }

    let output =
        output.ok_or_else(|| Error::Usage("join requires --output <directory>".to_string()))?;
    if specs.len() < 2 {
        return Err(Error::Usage(
            "join requires a main and at least one secondary repository".to_string(),
        ));
    }
    let main = specs.remove(0);
    Ok(Options::Join(JoinOptions {
        output,
        main,
        secondaries: specs,
        subdirs,
        quiet,
    }))
}

fn parse_filter_blobs(args: &[String]) -> Result<Options> {
    let mut extensions: Option<Vec<String>> = None;
    let mut size_limit: Option<usize> = None;
    let mut branch: Option<String> = None;
    let mut config: Option<PathBuf> = None;
    let mut quiet = false;
    let mut positional: Vec<String> = Vec::new();

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-q" | "--quiet" => quiet = true,
            "-f" | "--file-filter" => {
                let value = it
                    .next()
                    .ok_or_else(|| Error::Usage("--file-filter requires a value".to_string()))?;
                extensions = Some(parse_extension_list(value));
            }
            "-l" | "--size-limit" => {
                let value = it
                    .next()
                    .ok_or_else(|| Error::Usage("--size-limit requires a value".to_string()))?;
                let parsed = value.parse::<usize>().map_err(|_| {
                    Error::Usage(format!("bad --size-limit value {:?}", value))
                })?;
                size_limit = Some(parsed);
            }
            "-b" | "--branch" => {
                let value = it
                    .next()
                    .ok_or_else(|| Error::Usage("--branch requires a value".to_string()))?;
                branch = Some(value.clone());
            }
            "-c" | "--config" => {
                let value = it
                    .next()
                    .ok_or_else(|| Error::Usage("--config requires a value".to_string()))?;
                config = Some(PathBuf::from(value));
            }
            s if s.starts_with('-') => {
                return Err(Error::Usage(format!("unknown filter-blobs option {:?}", s)))
            }
            s => positional.push(s.to_string()),
        }
    }

    if positional.len() != 3 {
        return Err(Error::Usage(
            "filter-blobs requires INPUT OUTPUT FILTER".to_string(),
        ));
    }
    let command = positional.pop().unwrap_or_default();
    let output = PathBuf::from(positional.pop().unwrap_or_default());
    let input = PathBuf::from(positional.pop().unwrap_or_default());
    if command.trim().is_empty() {
        return Err(Error::Usage("the FILTER command must not be empty".to_string()));
    }

    let mut opts = FilterBlobsOptions {
        input,
        output,
        command,
        extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        size_limit: DEFAULT_SIZE_LIMIT,
        branch: DEFAULT_BRANCH.to_string(),
        quiet,
    };
    if let Some(path) = config {
        load_config(&path)?.apply(&mut opts);
    }
    if let Some(extensions) = extensions {
        opts.extensions = extensions;
    }
    if let Some(size_limit) = size_limit {
        opts.size_limit = size_limit;
    }
    if let Some(branch) = branch {
        opts.branch = branch;
    }
    Ok(Options::FilterBlobs(opts))
}

fn parse_extension_list(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    filter: Option<FilterFileConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterFileConfig {
    extensions: Option<Vec<String>>,
    size_limit: Option<usize>,
    branch: Option<String>,
}

impl FileConfig {
    fn apply(self, opts: &mut FilterBlobsOptions) {
        let Some(filter) = self.filter else { return };
        if let Some(extensions) = filter.extensions {
            opts.extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        }
        if let Some(size_limit) = filter.size_limit {
            opts.size_limit = size_limit;
        }
        if let Some(branch) = filter.branch {
            opts.branch = branch;
        }
    }
}

fn load_config(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path).map_err(|e| Error::Config {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    toml::from_str(&text).map_err(|e| Error::Config {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}
