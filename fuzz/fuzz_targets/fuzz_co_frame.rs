//! Fuzz target: `co::decode_concentration`
//!
//! Arbitrary 9-byte responses from the CO module must either be rejected
//! or decode to a finite, non-negative concentration.
//!
//! cargo fuzz run fuzz_co_frame

#![no_main]

use airsense::sensors::co::{FRAME_LEN, decode_concentration, validate_ppm};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = <[u8; FRAME_LEN]>::try_from(data) else {
        return;
    };
    if let Ok(sample) = decode_concentration(&frame) {
        assert!(sample.ppm.is_finite());
        assert!(sample.ppm >= 0.0);
        let _ = validate_ppm(sample.ppm);
    }
});
