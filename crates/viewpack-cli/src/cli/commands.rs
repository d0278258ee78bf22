use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Available viewpack subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a bundle once and write it out
    ///
    /// Compiles the entry file (plus the view manifest when --views is
    /// given) in a worker process and writes the bundle to --out, or to
    /// stdout when no output file is named.
    Build(BuildArgs),

    /// Serve a bundle over HTTP
    ///
    /// Serves /<name>.js, and /<name>.html for the bundle visualization.
    /// The bundle is rebuilt on the first request after a watched file
    /// changes; concurrent requests share one build.
    Serve(ServeArgs),

    /// Run a build worker on stdin/stdout
    ///
    /// Started by the worker pool; not meant to be run by hand.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// What to bundle, shared by `build` and `serve`
#[derive(Args, Debug, Clone)]
pub struct BundleArgs {
    /// Entry file of the bundle
    #[arg(value_name = "ENTRY")]
    pub entry: PathBuf,

    /// Project root holding viewpack.toml / viewpack.json
    ///
    /// Relative paths on the command line are resolved against it, and the
    /// build workers run inside it.
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub root: PathBuf,

    /// Views directory to expose to the bundle as the view manifest
    ///
    /// Every view found there is compiled into the bundle and its files are
    /// added to the watch list.
    #[arg(long, value_name = "DIR")]
    pub views: Option<PathBuf>,

    /// Inner extension of view files, e.g. `.ejs` for `index.ejs.js`
    #[arg(long, value_name = "EXT")]
    pub sub_extension: Option<String>,

    /// Only treat files carrying --sub-extension as views
    #[arg(long, requires = "sub_extension")]
    pub require_sub_extension: bool,

    /// Extra file whose change triggers a rebuild
    #[arg(long, value_name = "FILE")]
    pub watch: Vec<PathBuf>,

    /// Server-only file that must never be bundled
    #[arg(long = "node-file", value_name = "FILE")]
    pub node_files: Vec<PathBuf>,

    /// Build flag overrides, applied after the configured ones
    ///
    /// Space-separated `+flag` / `-flag` pairs, e.g.
    /// `--opts "+production -minimize"`.
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    pub opts: Option<String>,
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// File to write the bundle to (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// File to write the bundle visualization to
    ///
    /// Only produced when the `use_disc` flag is on, which it is by default
    /// outside production builds.
    #[arg(long, value_name = "FILE")]
    pub disc_out: Option<PathBuf>,
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Route name; the bundle is served at /<name>.js
    #[arg(long, default_value = "bundle")]
    pub name: String,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,
}

/// Arguments for the worker command
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Project root holding viewpack.toml / viewpack.json
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub root: PathBuf,
}
