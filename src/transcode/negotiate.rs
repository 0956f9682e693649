//! Encoder format negotiation
//!
//! Reconciles what a decoder produces with what an encoder accepts.  Both
//! functions take the encoder's capability list as an `Option`: `None` means
//! the encoder advertises no restriction, and the decoder's value passes
//! through untouched.  A `Some` list must not be empty.

/// Pick the sample format the encoder will be opened with.
///
/// The decoder's format wins when the encoder supports it (no conversion
/// needed); otherwise the encoder's first listed format is used.
pub fn choose_sample_format<T>(decoder_format: T, supported: Option<&[T]>) -> T
where
    T: Copy + PartialEq,
{
    let Some(supported) = supported else {
        return decoder_format;
    };

    if supported.contains(&decoder_format) {
        return decoder_format;
    }

    supported.first().copied().unwrap_or(decoder_format)
}

/// Pick the sample rate the encoder will be opened with.
///
/// An exact match is kept; otherwise the supported rate closest to the
/// decoder's rate, first one found on ties.
pub fn choose_sample_rate(decoder_rate: i32, supported: Option<&[i32]>) -> i32 {
    let Some(supported) = supported else {
        return decoder_rate;
    };

    let mut closest: Option<i32> = None;
    for &rate in supported {
        if rate == decoder_rate {
            return decoder_rate;
        }
        let better = match closest {
            None => true,
            Some(c) => distance(rate, decoder_rate) < distance(c, decoder_rate),
        };
        if better {
            closest = Some(rate);
        }
    }

    closest.unwrap_or(decoder_rate)
}

fn distance(a: i32, b: i32) -> i64 {
    (a as i64 - b as i64).abs()
}
