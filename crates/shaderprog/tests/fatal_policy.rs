use std::env;
use std::process::Command;

use shaderprog::{
    Capabilities, FatalPolicy, HeadlessDriver, MemoryLoader, ProgramRegistry, ProgramState,
    ShaderStage,
};

const CHILD_ENV: &str = "SHADERPROG_FATAL_CHILD";

fn loader() -> MemoryLoader {
    MemoryLoader::new()
        .with("flat.vert", "uniform mat4 mvp_matrix;\nvoid main() {}\n")
        .with("flat.frag", "void main() {}\n")
}

/// Reruns a single test of this binary with `CHILD_ENV` set.
fn rerun(test: &str) -> std::process::Output {
    let exe = env::current_exe().expect("test binary path");
    Command::new(exe)
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .output()
        .expect("rerun test binary")
}

#[test]
fn default_policy_aborts_on_compile_failure() {
    if env::var_os(CHILD_ENV).is_some() {
        let mut driver = HeadlessDriver::new();
        driver.fail_compile(Some(ShaderStage::Fragment));
        let mut registry = ProgramRegistry::new(FatalPolicy::default());
        registry
            .load("flat", "flat.vert", "flat.frag", Capabilities::empty(), &loader())
            .expect("sources inflate");
        let _ = registry.hydrate_all(&mut driver);
        println!("hydrate_all returned");
        return;
    }

    let output = rerun("default_policy_aborts_on_compile_failure");
    assert!(!output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("hydrate_all returned"), "{stdout}");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // SIGABRT
        assert_eq!(output.status.signal(), Some(6));
    }
}

#[test]
fn abort_policy_also_guards_lazy_binding() {
    if env::var_os(CHILD_ENV).is_some() {
        let mut driver = HeadlessDriver::new();
        driver.fail_link(true);
        let mut registry = ProgramRegistry::new(FatalPolicy::Abort);
        let id = registry
            .load("flat", "flat.vert", "flat.frag", Capabilities::empty(), &loader())
            .expect("sources inflate");
        let _ = registry.ensure_bound(id, &mut driver);
        println!("ensure_bound returned");
        return;
    }

    let output = rerun("abort_policy_also_guards_lazy_binding");
    assert!(!output.status.success(), "{output:?}");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("ensure_bound returned"));
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(output.status.signal(), Some(6));
    }
}

#[test]
fn propagate_policy_keeps_the_process_alive() {
    let mut driver = HeadlessDriver::new();
    driver.fail_compile(Some(ShaderStage::Fragment));
    let mut registry = ProgramRegistry::new(FatalPolicy::Propagate);
    let id = registry
        .load("flat", "flat.vert", "flat.frag", Capabilities::empty(), &loader())
        .unwrap();

    assert!(registry.hydrate_all(&mut driver).is_err());
    assert_eq!(registry.get(id).unwrap().state(), ProgramState::Failed);
    assert!(!registry.ensure_bound(id, &mut driver).unwrap());
    registry.shutdown(&mut driver);
}
