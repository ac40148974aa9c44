//! Topic name/filter validation for PUBLISH, SUBSCRIBE, UNSUBSCRIBE.

use crate::error::DecoderError;

/// A PUBLISH topic name: non-empty, no wildcards.
pub fn validate_topic_name(name: &str) -> Result<(), DecoderError> {
    if name.is_empty() {
        return Err(DecoderError::InvalidTopicName("topic name must not be empty"));
    }
    if name.contains(['#', '+']) {
        return Err(DecoderError::InvalidTopicName("topic name must not contain wildcards"));
    }
    Ok(())
}

/// A SUBSCRIBE/UNSUBSCRIBE topic filter: `+` may only stand alone as a
/// full path segment, `#` may only appear as the final full path segment
/// (`[MQTT-4.7.1-2]`/`[MQTT-4.7.1-3]`/`[MQTT-4.7.3-1]`).
pub fn validate_topic_filter(filter: &str) -> Result<(), DecoderError> {
    if filter.is_empty() {
        return Err(invalid_filter(filter, "topic filter must not be empty"));
    }
    let segments: Vec<&str> = filter.split('/').collect();
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if segment.contains('+') && *segment != "+" {
            return Err(invalid_filter(filter, "'+' must occupy a whole path segment"));
        }
        if segment.contains('#') {
            if *segment != "#" {
                return Err(invalid_filter(filter, "'#' must occupy a whole path segment"));
            }
            if i != last {
                return Err(invalid_filter(filter, "'#' must be the last path segment"));
            }
        }
    }
    Ok(())
}

fn invalid_filter(filter: &str, reason: &'static str) -> DecoderError {
    DecoderError::InvalidTopicFilter { filter: filter.to_string(), reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_filters() {
        for filter in ["a", "a/b", "+", "a/+/b", "a/#", "#"] {
            assert!(validate_topic_filter(filter).is_ok(), "{filter} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_filters() {
        for filter in ["a+", "+a", "a/#/b", ""] {
            assert!(validate_topic_filter(filter).is_err(), "{filter} should be invalid");
        }
    }

    #[test]
    fn topic_names_reject_wildcards_and_empty() {
        assert!(validate_topic_name("a/b").is_ok());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("a/#").is_err());
        assert!(validate_topic_name("a/+").is_err());
    }
}
