//! Fuzz target for EntryPath::parse with arbitrary string input.
//!
//! Entry names come straight from archive headers, so every name that is
//! accepted must stay inside the directory it is extracted to.
//!
//! Run with: cargo +nightly fuzz run entry_path

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::{Component, Path};
use zipmount::codec::EntryPath;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok((path, _is_dir)) = EntryPath::parse(raw) else {
        return;
    };

    let normalized = path.as_str();
    assert!(!normalized.starts_with('/'), "Absolute name accepted: {:?}", normalized);
    assert!(!normalized.contains('\0'), "NUL byte accepted: {:?}", normalized);
    assert!(
        !normalized.split('/').any(|s| s.is_empty() || s == "." || s == ".."),
        "Unsafe segment accepted: {:?}",
        normalized
    );

    let base = Path::new("/base");
    let native = path.to_native(base);
    assert!(native.starts_with(base));
    assert!(
        native
            .strip_prefix(base)
            .map(|rest| rest.components().all(|c| matches!(c, Component::Normal(_))))
            .unwrap_or(false),
        "Escaping path: {:?}",
        native
    );
});
