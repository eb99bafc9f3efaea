use std::path::Path;
use std::process::Command;

fn git_describe() -> Option<String> {
    Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}

fn main() {
    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = match git_describe() {
        Some(rev) => format!("{pkg_version} ({rev})"),
        None => pkg_version,
    };
    println!("cargo:rustc-env=WGPEER_VERSION={version}");
    println!("cargo::rustc-check-cfg=cfg(distribute)");

    // PROFILE only reports debug/release; custom profiles show up in OUT_DIR.
    let out_dir = std::env::var("OUT_DIR").unwrap_or_default();
    if Path::new(&out_dir)
        .components()
        .any(|c| c.as_os_str() == "distribute")
    {
        println!("cargo:rustc-cfg=distribute");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
}
