//! Report bursts: one client's per-step telemetry split into ordered parts.

use lockstep_env::{Message, Payload};

/// Iterator over the `Report` messages of one burst.
///
/// Part `i` of `n` carries `remaining = n - 1 - i`, so the counter strictly
/// decreases and the final part carries exactly 0. The coordinator detects
/// the end of a burst from that zero, never from a part count.
#[derive(Debug)]
pub struct ReportBurst {
    parts: std::vec::IntoIter<Payload>,
}

impl ReportBurst {
    /// Creates a burst, or `None` for an empty part list.
    pub fn new(parts: Vec<Payload>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        Some(Self {
            parts: parts.into_iter(),
        })
    }
}

impl Iterator for ReportBurst {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        let payload = self.parts.next()?;
        Some(Message::Report {
            remaining: self.parts.len() as u32,
            payload,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.parts.size_hint()
    }
}

impl ExactSizeIterator for ReportBurst {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn remaining_of(message: &Message) -> u32 {
        match message {
            Message::Report { remaining, .. } => *remaining,
            other => panic!("expected report, got {:?}", other),
        }
    }

    #[test]
    fn test_three_parts_count_down_to_zero() {
        let parts = vec![
            Payload::new(json!("a")),
            Payload::new(json!("b")),
            Payload::new(json!("c")),
        ];
        let burst: Vec<Message> = ReportBurst::new(parts).unwrap().collect();

        let counts: Vec<u32> = burst.iter().map(remaining_of).collect();
        assert_eq!(counts, vec![2, 1, 0]);
        assert_eq!(
            burst[0],
            Message::Report { remaining: 2, payload: Payload::new(json!("a")) }
        );
    }

    #[test]
    fn test_empty_burst_is_rejected() {
        assert!(ReportBurst::new(Vec::new()).is_none());
    }

    proptest! {
        #[test]
        fn prop_remaining_strictly_decreases_to_zero(n in 1usize..64) {
            let parts = (0..n).map(|i| Payload::new(json!(i))).collect();
            let burst = ReportBurst::new(parts).unwrap();
            prop_assert_eq!(burst.len(), n);

            let messages: Vec<Message> = burst.collect();
            let counts: Vec<u32> = messages.iter().map(remaining_of).collect();

            prop_assert_eq!(*counts.last().unwrap(), 0);
            prop_assert!(counts.windows(2).all(|w| w[0] == w[1] + 1));

            // Part order is preserved
            for (i, message) in messages.iter().enumerate() {
                if let Message::Report { payload, .. } = message {
                    prop_assert_eq!(payload.as_value(), &json!(i));
                }
            }
        }
    }
}
