use camino::Utf8PathBuf;
use clap::Parser;
use const_format::concatcp;
use eyre::Result as EyreResult;

use crate::config::Config;
use crate::driver::Driver;
use crate::output::{OutputFormat, OutputWriter};

pub const EXAMPLES: &str = r"
  # Run the data exchange validation scenario
  $ utm-qualifier --config qualifier.json

  # Write reports to a custom directory with markdown console output
  $ utm-qualifier --config qualifier.json --output-dir out/ --output-format markdown
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  UTM_QUALIFIER_CONFIG    Path to the qualifier configuration\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    /// Path to the qualifier configuration
    #[arg(short, long, value_name = "PATH")]
    #[arg(env = "UTM_QUALIFIER_CONFIG", hide_env_values = true)]
    pub config: Utf8PathBuf,

    /// Directory the reports are written to
    #[arg(long, value_name = "PATH", default_value = "report")]
    pub output_dir: Utf8PathBuf,

    /// Format of the console output
    #[arg(long, value_enum, default_value_t = OutputFormat::PlainText)]
    pub output_format: OutputFormat,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        let config = Config::load(&self.config).await?;
        let output_writer = OutputWriter::new(self.output_format);

        Driver::new(config, self.output_dir, output_writer).run().await
    }
}
