// If the normal power profile is not specified, use the low power profile
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    if !cfg!(feature = "normal-power") {
        println!("cargo:rustc-cfg=feature=\"low-power\"");
    }
}
