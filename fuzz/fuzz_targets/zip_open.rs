//! Fuzz target for ZipArchive::new with arbitrary byte input.
//!
//! Exercises central directory parsing and entry decoding with malformed or
//! adversarial input, looking for panics, hangs, or unbounded allocations.
//!
//! Run with: cargo +nightly fuzz run zip_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use zipmount::codec::ZipArchive;

fuzz_target!(|data: &[u8]| {
    let Ok(mut archive) = ZipArchive::new(Cursor::new(data)) else {
        return;
    };

    for index in 0..archive.len() {
        let entry = &archive.entries()[index];
        let _ = entry.path.as_str();
        let _ = entry.is_symlink();
        let is_dir = entry.is_dir;

        // Decoding checks sizes and CRCs; errors are expected, panics are not
        if !is_dir {
            let _ = archive.read_entry(index);
        }
    }
});
