use std::env;

fn main() {
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let family = env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();

    // Windows uses a different calling convention, so only unix targets get the asm paths.
    let source = match (arch.as_str(), family.as_str()) {
        ("x86_64", "unix") => "asm/x86_64/primitives.S",
        ("aarch64", "unix") => "asm/aarch64/primitives.S",
        _ => "asm/fallback.c",
    };

    cc::Build::new().file(source).compile("shield_primitives");

    println!("cargo:rerun-if-changed=asm/x86_64/primitives.S");
    println!("cargo:rerun-if-changed=asm/aarch64/primitives.S");
    println!("cargo:rerun-if-changed=asm/fallback.c");
}
