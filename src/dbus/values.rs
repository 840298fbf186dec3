use zbus::zvariant::OwnedValue;

/// Convert a bus variant into JSON. Types without a JSON counterpart end up
/// as their textual form.
pub fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
    if let Ok(b) = <bool as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(b);
    }
    if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(i);
    }
    if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(u);
    }
    if let Ok(i) = <i32 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(i);
    }
    if let Ok(u) = <u32 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(u);
    }
    if let Ok(i) = <i16 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(i);
    }
    if let Ok(u) = <u16 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(u);
    }
    if let Ok(u) = <u8 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(u);
    }
    if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(f);
    }
    if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(s.to_string());
    }
    serde_json::json!(v.to_string())
}

/// Numeric reading of a metering value. Booleans, strings and the empty
/// array Venus OS uses for "invalid" are rejected.
pub fn value_as_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::Value;

    #[test]
    fn numeric_variants_convert() {
        let ov = OwnedValue::try_from(Value::from(-42i32)).unwrap();
        assert_eq!(owned_value_to_serde(&ov), serde_json::json!(-42));

        let ov = OwnedValue::from(1234.5f64);
        assert_eq!(owned_value_to_serde(&ov), serde_json::json!(1234.5));

        let ov = OwnedValue::from(7u64);
        assert_eq!(owned_value_to_serde(&ov), serde_json::json!(7));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let ov = OwnedValue::from(true);
        let v = owned_value_to_serde(&ov);
        assert_eq!(v, serde_json::json!(true));
        assert_eq!(value_as_f64(&v), None);

        let ov = OwnedValue::try_from(Value::from("n/a")).unwrap();
        assert_eq!(value_as_f64(&owned_value_to_serde(&ov)), None);

        assert_eq!(value_as_f64(&serde_json::json!([])), None);
        assert_eq!(value_as_f64(&serde_json::json!(12)), Some(12.0));
    }
}
