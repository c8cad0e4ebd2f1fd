fn main() {
    // The ESP-IDF environment is only needed for Xtensa firmware builds;
    // host builds and tests skip it. Build scripts run on the host, so the
    // target comes from the TARGET env var.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") {
            embuild::espidf::sysenv::output();
        }
    }
}
