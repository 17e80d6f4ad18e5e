fn main() {
    // The ESP-IDF environment only exists for device builds; host builds
    // (tests, fuzzing) have nothing to export.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
