use std::env;
use std::process::Command;

fn git_short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    let base = env!("CARGO_PKG_VERSION");
    let nightly = matches!(
        env::var("SEVC_NIGHTLY").as_deref().map(str::to_ascii_lowercase).as_deref(),
        Ok("1" | "true")
    );

    let version = if nightly {
        // Tarball builds have no checkout; CI passes GIT_SHA instead
        let sha = git_short_sha().or_else(|| env::var("GIT_SHA").ok().filter(|s| !s.is_empty()));
        match sha {
            Some(sha) => format!("{base}-nightly+{sha}"),
            None => format!("{base}-nightly"),
        }
    } else {
        base.to_string()
    };

    println!("cargo:rustc-env=APP_VERSION={version}");
    for var in ["SEVC_NIGHTLY", "GIT_SHA"] {
        println!("cargo:rerun-if-env-changed={var}");
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
}
