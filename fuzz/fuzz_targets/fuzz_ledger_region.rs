//! Fuzz target: durable ledger region decoder
//!
//! Treats the input as a raw flash blob and checks:
//! - `decode_region` never panics, whatever the header says
//! - Every decoded volume is finite (erased flash reads as NaN)
//! - A decoded ledger re-encodes to a region that decodes to itself
//!
//! cargo fuzz run fuzz_ledger_region

#![no_main]

use filtermon::app::ledger::FilterId;
use filtermon::storage::layout;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(ledger) = layout::decode_region(data) else {
        return;
    };

    assert!(ledger.aggregate().all_time_volume_l.is_finite());
    for id in FilterId::ALL {
        let r = ledger.record(id);
        assert!(r.initial_volume_l.is_finite());
        assert!(r.processed_volume_l.is_finite());
        assert!(r.remaining_volume_l.is_finite());
    }

    let region = layout::encode_region(&ledger);
    assert_eq!(layout::decode_region(&region), Ok(ledger));
});
