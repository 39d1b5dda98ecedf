//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::dispatch::{DispatchConfig, DEFAULT_BCC_TOOLS_DIR, DEFAULT_BPFTRACE_BINARY};
use crate::domain::{
    OutputDestination, OutputMode, TargetScope, TraceRequest, TracerKind, ValidationError,
};
use crate::output::flamegraph::{DEFAULT_FLAMEGRAPH_BINARY, DEFAULT_STACKCOLLAPSE_BINARY};
use crate::output::FlameGraphConfig;
use crate::runner::RunnerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "trace-runner",
    about = "Run a bpftrace or bcc program against a node, pod or container",
    after_help = "\
EXAMPLES:
    trace-runner -f program.bt                                   Trace the whole node
    trace-runner --target container -p <POD_UID> -c web -f p.bt  Attach to a container
    trace-runner --tracer bcc -f opensnoop --program-args '-d 5' Run a bcc tool
    trace-runner --flamegraph --output file --output-path /out/fg.svg -f stacks.bt"
)]
pub struct Args {
    /// Tracer backend: bpftrace or bcc
    #[arg(long, default_value = "bpftrace")]
    pub tracer: String,

    /// Scope of the trace: node, pod or container
    #[arg(long, default_value = "node")]
    pub target: String,

    /// Same as --target container
    #[arg(long)]
    pub inpod: bool,

    /// Pod UID (required for container targets)
    #[arg(short = 'p', long, default_value = "")]
    pub poduid: String,

    /// Container name (required for container targets)
    #[arg(short, long, default_value = "")]
    pub container: String,

    /// bpftrace program path, or bcc tool name
    #[arg(short = 'f', long, default_value = "program.bt")]
    pub program: String,

    /// Arguments passed to the bcc tool, split with shell quoting rules
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub program_args: String,

    /// Output destination: stdout, file or directory
    #[arg(long, default_value = "stdout")]
    pub output: String,

    /// Path used by file and directory outputs
    #[arg(long, alias = "flamegraph-output-path", default_value = "/tmp/flamegraph.svg")]
    pub output_path: PathBuf,

    /// Render captured stacks as a flame graph (stack, kstack and ustack output only)
    #[arg(long)]
    pub flamegraph: bool,

    #[arg(short = 'b', long = "bpftracebinary", default_value = DEFAULT_BPFTRACE_BINARY)]
    pub bpftrace_binary: PathBuf,

    #[arg(long = "bcctoolsdir", default_value = DEFAULT_BCC_TOOLS_DIR)]
    pub bcc_tools_dir: PathBuf,

    #[arg(long = "flamegraphbinary", default_value = DEFAULT_FLAMEGRAPH_BINARY)]
    pub flamegraph_binary: PathBuf,

    #[arg(long = "stackcollapsebinary", default_value = DEFAULT_STACKCOLLAPSE_BINARY)]
    pub stackcollapse_binary: PathBuf,

    /// Directory for rendered container programs (default: system temp dir)
    #[arg(long)]
    pub render_dir: Option<PathBuf>,

    /// Exit non-zero when the trace fails
    #[arg(long)]
    pub strict_exit: bool,

    /// Skip privilege and binary checks
    #[arg(long)]
    pub skip_preflight: bool,
}

impl Args {
    /// Build the request, rejecting unsupported selector values.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found.
    pub fn to_request(&self) -> Result<TraceRequest, ValidationError> {
        let tracer: TracerKind = self.tracer.parse()?;
        let target = if self.inpod { TargetScope::Container } else { self.target.parse()? };
        let output = if self.flamegraph { OutputMode::FlameGraph } else { OutputMode::Stream };
        let destination = OutputDestination::from_selector(&self.output, &self.output_path)?;
        let program_args = shell_words::split(&self.program_args).map_err(|source| {
            ValidationError::InvalidProgramArgs { args: self.program_args.clone(), source }
        })?;

        let request = TraceRequest {
            tracer,
            target,
            pod_uid: self.poduid.clone(),
            container: self.container.clone(),
            program: self.program.clone(),
            program_args,
            output,
            destination,
        };
        request.validate()?;
        Ok(request)
    }

    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let defaults = DispatchConfig::default();
        RunnerConfig {
            dispatch: DispatchConfig {
                bpftrace_binary: self.bpftrace_binary.clone(),
                bcc_tools_dir: self.bcc_tools_dir.clone(),
                render_dir: self.render_dir.clone().unwrap_or(defaults.render_dir),
            },
            flamegraph: FlameGraphConfig {
                stackcollapse_binary: self.stackcollapse_binary.clone(),
                flamegraph_binary: self.flamegraph_binary.clone(),
            },
        }
    }
}
