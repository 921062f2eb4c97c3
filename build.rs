use std::env;

fn main() {
    // Host builds (tests, docs) never link the firmware images
    let arm = env::var("CARGO_CFG_TARGET_ARCH").map(|arch| arch == "arm").unwrap_or(false);
    if !arm || env::var_os("CARGO_FEATURE_SOFTDEVICE").is_none() {
        return;
    }

    // Tell the linker where to find memory.x
    println!("cargo:rustc-link-search={}", env!("CARGO_MANIFEST_DIR"));
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    // Only re-run the build script when memory.x is changed
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}
