#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz TOML parsing of ConverterConfig and ensure it never panics and rejects
    // invalids gracefully. Accept both parse errors and validation errors.
    let parsed = regconv_config::load_toml(data);
    match parsed {
        Ok(cfg) => {
            let _ = cfg.validate();
        }
        Err(_e) => {}
    }
});
