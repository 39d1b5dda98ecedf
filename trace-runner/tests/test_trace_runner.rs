use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracerunner::dispatch::DispatchConfig;
use tracerunner::domain::{
    LocateError, OutputDestination, OutputMode, Pid, PipelineError, SupervisorError, TargetScope,
    TraceError, TraceRequest, TracerKind,
};
use tracerunner::output::FlameGraphConfig;
use tracerunner::process_lookup::ProcFs;
use tracerunner::runner::{RunnerConfig, TraceRunner};
use tracerunner::supervisor::{InterruptEvent, InterruptState};

/// Host layout for one test: fake process table, program dir, render dir, output dir
struct Fixture {
    root: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["proc", "programs", "render", "out"] {
            fs::create_dir(root.path().join(dir)).unwrap();
        }
        Self { root }
    }

    fn dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn add_process(&self, pid: u32, roots: &[&str]) {
        let dir = self.dir("proc").join(pid.to_string());
        fs::create_dir(&dir).unwrap();
        let content: String = roots
            .iter()
            .map(|root| format!("1 0 0:52 {root} /etc/hosts rw,relatime - ext4 /dev/sda1 rw\n"))
            .collect();
        fs::write(dir.join("mountinfo"), content).unwrap();
    }

    fn add_program(&self, name: &str, source: &str) -> String {
        let path = self.dir("programs").join(name);
        fs::write(&path, source).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// `/bin/sh` stands in for bpftrace, `cat` for both flame graph stages.
    fn runner(&self, render: &str) -> TraceRunner<ProcFs> {
        let config = RunnerConfig {
            dispatch: DispatchConfig {
                bpftrace_binary: PathBuf::from("/bin/sh"),
                bcc_tools_dir: PathBuf::from("/usr/share/bcc/tools"),
                render_dir: self.dir("render"),
            },
            flamegraph: FlameGraphConfig {
                stackcollapse_binary: PathBuf::from("cat"),
                flamegraph_binary: PathBuf::from(render),
            },
        };
        TraceRunner::with_table(config, ProcFs::new(self.dir("proc")))
    }

    fn rendered_files(&self) -> usize {
        fs::read_dir(self.dir("render")).unwrap().count()
    }
}

fn request(target: TargetScope, program: String, output: OutputMode, out: &Path) -> TraceRequest {
    TraceRequest {
        tracer: TracerKind::Bpftrace,
        target,
        pod_uid: "abc123".to_string(),
        container: "web".to_string(),
        program,
        program_args: Vec::new(),
        output,
        destination: OutputDestination::File(out.to_path_buf()),
    }
}

fn no_interrupts() -> mpsc::Receiver<InterruptEvent> {
    mpsc::channel(4).1
}

#[tokio::test]
async fn test_container_trace_renders_pid_into_flamegraph() {
    let fx = Fixture::new();
    fx.add_process(1, &["/"]);
    fx.add_process(4821, &["/var/lib/containers/pod-abc123/container-web/etc-hosts"]);
    let program = fx.add_program("program.bt", "echo \"attach $container_pid { ... }\"\n");
    let out = fx.dir("out").join("flamegraph.svg");

    let summary = fx
        .runner("cat")
        .run_with_interrupts(
            &request(TargetScope::Container, program.clone(), OutputMode::FlameGraph, &out),
            no_interrupts(),
        )
        .await
        .expect("trace should succeed");

    assert_eq!(summary.resolved, Some(Pid(4821)));
    assert_eq!(summary.outcome.final_state, InterruptState::Idle);
    assert_eq!(summary.artifact.unwrap().path, Some(out.clone()));
    assert_eq!(fs::read_to_string(&out).unwrap(), "attach 4821 { ... }\n");

    // Rendered copy removed, original untouched
    assert_eq!(fx.rendered_files(), 0);
    assert!(fs::read_to_string(&program).unwrap().contains("$container_pid"));
}

#[tokio::test]
async fn test_stream_output_to_directory() {
    let fx = Fixture::new();
    let program = fx.add_program("hello.bt", "echo sample-1\necho sample-2\n");
    let mut req = request(TargetScope::Node, program, OutputMode::Stream, Path::new("unused"));
    req.destination = OutputDestination::Directory(fx.dir("out"));

    let summary = fx.runner("cat").run_with_interrupts(&req, no_interrupts()).await.unwrap();

    assert!(summary.artifact.is_none());
    assert_eq!(
        fs::read_to_string(fx.dir("out").join("trace.txt")).unwrap(),
        "sample-1\nsample-2\n"
    );
}

#[tokio::test]
async fn test_unknown_container_is_not_found() {
    let fx = Fixture::new();
    fx.add_process(10, &["/var/lib/containers/pod-abc123/container-db"]);
    let program = fx.add_program("program.bt", "echo $container_pid\n");
    let out = fx.dir("out").join("trace.txt");

    let err = fx
        .runner("cat")
        .run_with_interrupts(
            &request(TargetScope::Container, program, OutputMode::Stream, &out),
            no_interrupts(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TraceError::Locate(LocateError::NotFound { .. })));
    assert_eq!(fx.rendered_files(), 0);
    assert!(!out.exists());
}

#[tokio::test]
async fn test_failed_render_stage_leaves_no_artifact() {
    let fx = Fixture::new();
    // Enough samples to overflow the pipe into the render stage
    let program = fx.add_program("stacks.bt", "yes '@[main+12]: 1' | head -n 50000\n");
    let out = fx.dir("out").join("flamegraph.svg");

    let err = fx
        .runner("false")
        .run_with_interrupts(
            &request(TargetScope::Node, program, OutputMode::FlameGraph, &out),
            no_interrupts(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TraceError::Pipeline(PipelineError::StageFailed { stage: "flamegraph", .. })
    ));
    assert!(!out.exists());
    assert_eq!(fs::read_dir(fx.dir("out")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_second_interrupt_stops_tracer() {
    let fx = Fixture::new();
    fx.add_process(4821, &["/pods/abc123/containers/web/0"]);
    let program = fx.add_program("forever.bt", "exec sleep 30 # $container_pid\n");
    let out = fx.dir("out").join("trace.txt");

    let (tx, rx) = mpsc::channel(4);
    tx.send(InterruptEvent).await.unwrap();
    tx.send(InterruptEvent).await.unwrap();

    let started = Instant::now();
    let err = fx
        .runner("cat")
        .run_with_interrupts(&request(TargetScope::Container, program, OutputMode::Stream, &out), rx)
        .await
        .unwrap_err();

    assert!(matches!(err, TraceError::Supervisor(SupervisorError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(fx.rendered_files(), 0);
}

#[tokio::test]
async fn test_tracer_failure_is_returned() {
    let fx = Fixture::new();
    let program = fx.add_program("broken.bt", "exit 4\n");
    let out = fx.dir("out").join("flamegraph.svg");

    let err = fx
        .runner("cat")
        .run_with_interrupts(
            &request(TargetScope::Node, program, OutputMode::FlameGraph, &out),
            no_interrupts(),
        )
        .await
        .unwrap_err();

    match err {
        TraceError::Supervisor(SupervisorError::NonZeroExit { status, .. }) => {
            assert_eq!(status.code(), Some(4));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists());
}

#[tokio::test]
async fn test_bcc_tool_receives_args_verbatim() {
    let fx = Fixture::new();
    let out = fx.dir("out").join("trace.txt");
    let req = TraceRequest {
        tracer: TracerKind::Bcc,
        target: TargetScope::Pod,
        pod_uid: String::new(),
        container: String::new(),
        program: "/bin/echo".to_string(),
        program_args: vec!["-n".to_string(), "$container_pid".to_string()],
        output: OutputMode::Stream,
        destination: OutputDestination::File(out.clone()),
    };

    fx.runner("cat").run_with_interrupts(&req, no_interrupts()).await.unwrap();

    assert_eq!(fs::read_to_string(&out).unwrap(), "$container_pid");
}
