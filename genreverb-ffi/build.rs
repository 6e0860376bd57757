// Header generation for C/C++ hosts.
//
// With `cbindgen` on PATH the header is regenerated from src/lib.rs into
// $OUT_DIR and mirrored to include/genreverb.h. Without it, the checked-in
// include/genreverb.h is copied to $OUT_DIR unchanged.

use std::{env, fs, io, path::Path, path::PathBuf, process::Command};

const HEADER: &str = "genreverb.h";

fn cbindgen_available() -> bool {
    Command::new("cbindgen")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn run_cbindgen(crate_dir: &Path, out: &Path) -> bool {
    Command::new("cbindgen")
        .args(["--crate", "genreverb-ffi", "--lang", "C", "--output"])
        .arg(out)
        .current_dir(crate_dir)
        .status()
        .is_ok_and(|s| s.success())
}

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/{HEADER}");

    let crate_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap_or_default());
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap_or_default());
    let checked_in = crate_dir.join("include").join(HEADER);
    let generated = out_dir.join(HEADER);

    if cbindgen_available() {
        if run_cbindgen(&crate_dir, &generated) {
            let _ = fs::copy(&generated, &checked_in);
            return Ok(());
        }
        println!("cargo:warning=genreverb-ffi: cbindgen failed; using checked-in header");
    }

    fs::copy(&checked_in, &generated).map(|_| ())
}
