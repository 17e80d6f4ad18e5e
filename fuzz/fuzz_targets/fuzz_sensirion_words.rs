//! Fuzz target: `sensirion::decode_words`
//!
//! Feeds arbitrary response bytes into the CRC word decoder and checks
//! that every accepted word re-encodes to exactly the input bytes.
//!
//! cargo fuzz run fuzz_sensirion_words

#![no_main]

use airsense::sensors::sensirion::{decode_words, encode_words};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut words = [0u16; 16];
    if let Ok(n) = decode_words(data, &mut words) {
        assert_eq!(n * 3, data.len());
        let mut framed = vec![0u8; n * 3];
        let len = encode_words(&words[..n], &mut framed).expect("buffer sized for n words");
        assert_eq!(&framed[..len], data, "accepted frame must carry valid CRCs");
    }
});
