use std::io;
use std::process::{Command, Stdio};

fn git(args: &[&str]) -> Result<String, io::Error> {
    let cmd = Command::new("git")
        .args(args)
        .stderr(Stdio::inherit())
        .output()?;

    if !cmd.status.success() {
        return Err(io::Error::other(format!(
            "`git {}` failed: {}",
            args.join(" "),
            cmd.status
        )));
    }

    Ok(String::from_utf8_lossy(&cmd.stdout).trim().to_owned())
}

fn main() {
    // Builds outside of a git checkout still get both variables.
    let version = git(&["describe", "--always", "--dirty=-modified"])
        .unwrap_or_else(|_| "unknown".to_owned());
    println!("cargo:rustc-env=SIDEBYSIDE_GIT_VERSION={version}");
    println!("cargo:rerun-if-env-changed=SIDEBYSIDE_GIT_VERSION");

    let release = git(&["rev-parse", "HEAD"]).unwrap_or_else(|_| {
        format!("sidebyside@{}", env!("CARGO_PKG_VERSION"))
    });
    println!("cargo:rustc-env=SIDEBYSIDE_RELEASE={release}");
    println!("cargo:rerun-if-env-changed=SIDEBYSIDE_RELEASE");
}
