pub mod blobfilter;
pub mod branchlog;
pub mod command;
pub mod error;
pub mod interleave;
pub mod marks;
pub mod opts;
pub mod paths;
pub mod pipes;
pub mod progress;
pub mod refs;
pub mod stream;

pub use error::{Error, Result};
pub use opts::{FilterBlobsOptions, JoinOptions, Options, RepoSpec};

pub fn run(opts: &Options) -> Result<()> {
    match opts {
        Options::Join(join) => run_join(join),
        Options::FilterBlobs(filter) => run_filter_blobs(filter),
    }
}

/// Export every input repository, stitch the histories into one
/// time-ordered sequence, and import the result into the output directory.
pub fn run_join(opts: &JoinOptions) -> Result<()> {
    if !opts.quiet {
        eprintln!("Exporting the main repository ({})...", opts.main.name);
    }
    let exported = pipes::fast_export(&opts.main.path)?;
    let mut cmds = stream::parse(&exported)?;
    let mut have_submodules = false;
    if opts.subdirs && paths::move_to_subdir(&mut cmds, opts.main.name.as_bytes())? {
        have_submodules = true;
    }
    refs::canonicalize(&mut cmds);

    for sec in &opts.secondaries {
        if !opts.quiet {
            eprintln!("Exporting {}...", sec.name);
        }
        let exported = pipes::fast_export(&sec.path)?;
        let mut sec_cmds = stream::parse(&exported)?;
        if opts.subdirs && paths::move_to_subdir(&mut sec_cmds, sec.name.as_bytes())? {
            if have_submodules {
                return Err(Error::SubmoduleConflict);
            }
            have_submodules = true;
        }
        if !opts.quiet {
            eprintln!("Merging {} into the stitched history...", sec.name);
        }
        cmds = interleave::merge(
            cmds,
            sec_cmds,
            opts.main.branch.as_bytes(),
            sec.branch.as_bytes(),
            sec.name.as_bytes(),
        )?;
    }

    pipes::prepare_output_dir(&opts.output)?;
    pipes::init_repo(&opts.output, opts.quiet)?;
    if !opts.quiet {
        eprintln!("Importing the stitched history into {}...", opts.output.display());
    }
    pipes::fast_import(&opts.output, &stream::serialize(&cmds), opts.quiet)?;
    pipes::reset_hard(&opts.output, &opts.main.branch, opts.quiet)?;
    Ok(())
}

/// Export the input repository, run the external filter over every selected
/// blob, and import the rewritten history into the output directory.
pub fn run_filter_blobs(opts: &FilterBlobsOptions) -> Result<()> {
    if !opts.quiet {
        eprintln!("Using file filter: {}", opts.extensions.join(","));
        eprintln!("Blob size limit:   {}", opts.size_limit);
        eprintln!("Main branch:       {}", opts.branch);
        eprintln!(
            "Exporting the source repository ({})...",
            opts.input.display()
        );
    }
    let exported = pipes::fast_export(&opts.input)?;
    let mut cmds = stream::parse(&exported)?;

    if !opts.quiet {
        eprintln!("Filtering blobs...");
    }
    let cfg = blobfilter::FilterConfig {
        command: opts.command.clone(),
        extensions: opts.extensions.clone(),
        size_limit: opts.size_limit,
        quiet: opts.quiet,
    };
    blobfilter::run(&mut cmds, &cfg)?;

    pipes::prepare_output_dir(&opts.output)?;
    pipes::init_repo(&opts.output, opts.quiet)?;
    if !opts.quiet {
        eprintln!(
            "Importing the filtered history into {}...",
            opts.output.display()
        );
    }
    pipes::fast_import(&opts.output, &stream::serialize(&cmds), opts.quiet)?;
    pipes::reset_hard(&opts.output, &opts.branch, opts.quiet)?;
    Ok(())
}
