//! Fuzz target: reset command decoders
//!
//! Feeds arbitrary bytes to both the broker message decoder and the web
//! form decoder and checks:
//! - No panics on malformed JSON, bad UTF-8 or broken percent-escapes
//! - Oversize input is always rejected
//! - A decoded request applied to a ledger keeps processed == total - initial
//!
//! cargo fuzz run fuzz_command_message

#![no_main]

use filtermon::app::commands::{self, CommandError, CommandProcessor, MAX_COMMAND_LEN};
use filtermon::app::ledger::{FilterId, FilterLedger};
use filtermon::app::timestamp::Timestamp;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let message = commands::decode_message(data);
    if data.len() > MAX_COMMAND_LEN {
        assert_eq!(message, Err(CommandError::TooLong));
    }

    let form = core::str::from_utf8(data).map(commands::decode_form);

    let processor = CommandProcessor::new();
    let now = Timestamp::from_epoch_secs(1_720_000_000);
    for request in [message.ok(), form.ok().and_then(Result::ok)].into_iter().flatten() {
        let mut ledger = FilterLedger::new();
        ledger.add_volume(42.0);
        processor.apply(&mut ledger, &request, now);

        let total = ledger.aggregate().all_time_volume_l;
        for id in FilterId::ALL {
            let r = ledger.record(id);
            assert_eq!(r.processed_volume_l, total - r.initial_volume_l);
        }
    }
});
