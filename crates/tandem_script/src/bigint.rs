//! Exact conversion between JS BigInts and `BigWords`
//!
//! Small magnitudes take the engine's native 64-bit paths. Everything else
//! travels as little-endian magnitude bytes with the sign reapplied
//! separately.

use crate::error::translate;
use crate::prelude::Prelude;
use rquickjs::BigInt;
use tandem_core::{BigWords, BridgeError, BridgingFault};

pub(crate) fn to_host<'js>(
    prelude: &Prelude<'js>,
    value: BigInt<'js>,
) -> Result<BigWords, BridgeError> {
    let ctx = prelude.ctx();
    let (negative, bits) = prelude.big_shape(&value)?;

    if bits < 63 {
        let small = value.to_i64().map_err(|err| translate(ctx, err))?;
        return Ok(BigWords::from_i64(small));
    }
    if bits == 64 && !negative {
        // The engine reads BigInts modulo 2^64, so this is the exact u64.
        let wide = value.to_i64().map_err(|err| translate(ctx, err))? as u64;
        return Ok(BigWords::from_u64(wide));
    }

    let bytes = prelude.export_magnitude(&value)?;
    BigWords::from_magnitude_le_bytes(negative, &bytes, bits)
        .map_err(|fault| {
            tracing::error!(%fault, bits, "guest integer export mismatch");
            fault.into()
        })
}

pub(crate) fn to_guest<'js>(
    prelude: &Prelude<'js>,
    value: &BigWords,
) -> Result<BigInt<'js>, BridgeError> {
    let ctx = prelude.ctx();
    let bits = value.bit_length();

    if bits < 63 {
        if let Some(small) = value.to_i64() {
            return BigInt::from_i64(ctx.clone(), small).map_err(|err| translate(ctx, err));
        }
    }
    if bits == 64 && !value.is_negative() {
        if let Some(wide) = value.to_u64() {
            return BigInt::from_u64(ctx.clone(), wide).map_err(|err| translate(ctx, err));
        }
    }

    let bytes = value.magnitude_le_bytes();
    let expected = bits.div_ceil(8) as usize;
    if bytes.len() != expected {
        let fault = BridgingFault::IntegerBuffer {
            expected,
            actual: bytes.len(),
        };
        tracing::error!(%fault, bits, "host integer export mismatch");
        return Err(fault.into());
    }

    let magnitude = prelude.import_magnitude(bytes)?;
    if value.is_negative() {
        prelude.negate(magnitude)
    } else {
        Ok(magnitude)
    }
}

#[cfg(test)]
mod tests {
    use crate::bridge::Bridge;
    use crate::error::translate;
    use crate::prelude::Prelude;
    use crate::value::Value;
    use rquickjs::BigInt;
    use tandem_core::{BigWords, BridgeConfig};

    const BIT_LENGTHS: [u64; 8] = [0, 1, 62, 63, 64, 65, 128, 4096];

    /// Largest magnitude with exactly `bits` bits.
    fn all_ones(bits: u64) -> BigWords {
        if bits == 0 {
            return BigWords::zero();
        }
        let full = (bits / 64) as usize;
        let mut words = vec![u64::MAX; full];
        if bits % 64 != 0 {
            words.push((1u64 << (bits % 64)) - 1);
        }
        BigWords::from_words(false, words)
    }

    fn samples() -> Vec<BigWords> {
        let mut values = Vec::new();
        for bits in BIT_LENGTHS {
            let ones = all_ones(bits);
            values.push(ones.negated());
            values.push(ones);
            if bits > 0 {
                let power = BigWords::power_of_two(bits - 1);
                values.push(power.negated());
                values.push(power);
            }
        }
        values
    }

    #[test]
    fn test_round_trip_every_bit_length() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let echo = bridge.eval("(x) => x").unwrap();
        for value in samples() {
            let back = bridge
                .invoke_guest(echo.as_guest().unwrap(), &[Value::Int(value.clone())], None)
                .unwrap();
            assert_eq!(
                back,
                Value::Int(value.clone()),
                "bits {}",
                value.bit_length()
            );
        }
    }

    #[test]
    fn test_guest_sees_exact_value() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let render = bridge.eval("(x) => typeof x + ':' + x.toString()").unwrap();
        for value in samples() {
            let text = bridge
                .invoke_guest(
                    render.as_guest().unwrap(),
                    &[Value::Int(value.clone())],
                    None,
                )
                .unwrap();
            assert_eq!(text, Value::Text(format!("bigint:{value}")));
        }
    }

    #[test]
    fn test_guest_literals_convert_exactly() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let cases = [
            ("0n", "0"),
            ("-1n", "-1"),
            ("2n ** 62n", "4611686018427387904"),
            ("-(2n ** 63n)", "-9223372036854775808"),
            ("2n ** 64n - 1n", "18446744073709551615"),
            ("-(2n ** 64n - 1n)", "-18446744073709551615"),
            ("2n ** 64n", "18446744073709551616"),
            ("-(2n ** 127n)", "-170141183460469231731687303715884105728"),
        ];
        for (source, expected) in cases {
            let value = bridge.eval(source).unwrap();
            assert_eq!(value.as_int().unwrap().to_string(), expected, "{source}");
        }
    }

    #[test]
    fn test_zero_is_canonical() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let zero = bridge.eval("-0n").unwrap();
        let zero = zero.as_int().unwrap();
        assert!(zero.is_zero());
        assert!(!zero.is_negative());
        assert_eq!(zero.words(), &[0]);
    }

    #[test]
    fn test_huge_power_of_two_crosses_intact() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let value = bridge.eval("-(2n ** 4095n)").unwrap();
        assert_eq!(value, Value::Int(BigWords::power_of_two(4095).negated()));
        assert_eq!(value.as_int().unwrap().bit_length(), 4096);
    }

    #[test]
    fn test_magnitude_export_yields_byte_values() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let bytes = bridge
            .script()
            .enter(|ctx| {
                let prelude = Prelude::new(ctx)?;
                let source = "-(2n ** 64n + 0x1ffn)";
                let value: BigInt = ctx.eval(source).map_err(|err| translate(ctx, err))?;
                prelude.export_magnitude(&value)
            })
            .unwrap();
        assert_eq!(bytes, vec![0xff, 0x01, 0, 0, 0, 0, 0, 0, 0x01]);
    }

    #[test]
    fn test_general_path_bit_lengths_leave_guest() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        for (source, bits) in [
            ("2n ** 62n", 63),
            ("-(2n ** 63n)", 64),
            ("-(2n ** 64n - 1n)", 64),
            ("2n ** 64n", 65),
            ("-(2n ** 127n + 1n)", 128),
        ] {
            let value = bridge.eval(source).unwrap();
            let int = value.as_int().unwrap();
            assert_eq!(int.bit_length(), bits, "{source}");
            let echoed = bridge.eval(&format!("({source}).toString()")).unwrap();
            assert_eq!(echoed, Value::Text(int.to_string()), "{source}");
        }
    }
}
