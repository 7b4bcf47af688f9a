#![no_main]

use libfuzzer_sys::fuzz_target;
use linkrtt::baseline::{parse_line, serialize, BaselineStore, BaselineStrictness};
use linkrtt::matrix::ProbeMatrix;
use linkrtt::probe::parse_probe_output;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Never panics, whatever the line looks like
        let _ = parse_probe_output(input, 1000.0);

        if input.contains(['\n', '\r']) {
            return;
        }
        if let Ok((source, target, cell)) = parse_line(input) {
            // An accepted line must survive a write/read cycle
            let matrix: ProbeMatrix = vec![(source, target, cell)].into_iter().collect();
            let text = serialize(&matrix);
            let reparsed =
                BaselineStore::parse(&text, Path::new("fuzz.ref"), BaselineStrictness::Strict);
            assert!(reparsed.is_ok(), "serialized line rejected: {:?}", text);
        }
    }
});
