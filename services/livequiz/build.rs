use std::env;
use std::fs;
use std::path::Path;

const QUIZ_CFG_NAME: &str = "livequiz.toml";
const LOG_CFG_NAME: &str = "livequiz.log.toml";

fn main() {
    let source_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();

    let source_path = Path::new(&source_dir).join("config");

    // Navigate three levels up...
    let out_path = Path::new(&out_dir)
        .parent()
        .and_then(|pth| pth.parent())
        .and_then(|pth| pth.parent())
        .expect("Failed navigating to the target directory");

    for name in &[QUIZ_CFG_NAME, LOG_CFG_NAME] {
        println!("cargo:rerun-if-changed=config/{}", name);

        fs::copy(source_path.join(name), out_path.join(name))
            .unwrap_or_else(|_| panic!("Failed to copy {}", name));
    }
}
