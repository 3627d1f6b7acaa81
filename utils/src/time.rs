pub fn get_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_timestamp_is_rfc3339_seconds() {
        let ts = get_timestamp();
        assert_eq!(ts.ends_with('Z'), true);
        assert_eq!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok(), true);
        assert_eq!(ts.contains('.'), false);
    }
}
