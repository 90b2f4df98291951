fn main() {
    println!("cargo:rerun-if-changed=data/config.json");

    // Host builds (tests, fuzzing) run without the ESP-IDF toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
