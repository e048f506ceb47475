#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing and validation must reject bad input without panicking
    if let Ok(config) = genwatch::Config::from_yaml_str(text) {
        let _ = config.validate();
        let _ = config.calibration.current().apply(1.0);
    }
});
