//! Anti-detection pacing policy and content variation.
//!
//! Pure functions; every random choice goes through `rand::rng()`.

use std::time::Duration;

use {
    rand::{Rng, seq::SliceRandom},
    serde::{Deserialize, Serialize},
};

use wablast_common::Target;

/// Placeholder substituted with the recipient's display-name hint.
const NAME_PLACEHOLDER: &str = "{name}";

/// Sample name used when previewing a message without a real recipient.
const PREVIEW_NAME: &str = "Budi";

const TYPING_MS_PER_CHAR: u64 = 100;
const TYPING_MIN: Duration = Duration::from_secs(2);
const TYPING_MAX: Duration = Duration::from_secs(10);

/// Delivery pacing knobs for one broadcast job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Inter-message delay bounds, in whole seconds.
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Messages between long rests; 0 disables batching.
    pub batch_size: u32,
    pub batch_rest_secs: u64,
    pub shuffle: bool,
    pub simulate_typing: bool,
    /// Send audio attachments as voice notes.
    pub send_as_voice: bool,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_delay_secs: 5,
            max_delay_secs: 10,
            batch_size: 0,
            batch_rest_secs: 60,
            shuffle: false,
            simulate_typing: false,
            send_as_voice: false,
        }
    }
}

impl Pacing {
    /// Uniformly-random inter-message delay in `[min, max]` seconds.
    pub fn random_delay(&self) -> Duration {
        let (lo, hi) = if self.min_delay_secs <= self.max_delay_secs {
            (self.min_delay_secs, self.max_delay_secs)
        } else {
            (self.max_delay_secs, self.min_delay_secs)
        };
        Duration::from_secs(rand::rng().random_range(lo..=hi))
    }

    /// Whether a batch rest is due after `sent` successful sends.
    pub fn batch_rest_due(&self, sent: u32) -> bool {
        self.batch_size > 0 && sent > 0 && sent % self.batch_size == 0
    }
}

/// Shuffle targets in place (Fisher–Yates via `rand`).
pub fn shuffle_targets(targets: &mut [Target]) {
    targets.shuffle(&mut rand::rng());
}

/// Typing-presence duration proportional to rendered length, bounded.
pub fn typing_duration(rendered_len: usize) -> Duration {
    Duration::from_millis(TYPING_MS_PER_CHAR * rendered_len as u64).clamp(TYPING_MIN, TYPING_MAX)
}

/// Expand every `{a|b|c}` group by picking one alternative uniformly at
/// random, repeating until no group remains so sequential groups each get an
/// independent pick. Alternatives are trimmed.
pub fn expand_spintax(text: &str) -> String {
    let mut text = text.to_string();
    while let Some((start, end)) = innermost_group(&text) {
        let pick = {
            let options: Vec<&str> = text[start + 1..end].split('|').map(str::trim).collect();
            options[rand::rng().random_range(0..options.len())].to_string()
        };
        text.replace_range(start..=end, &pick);
    }
    text
}

/// Byte offsets of the first `{...}` group that contains no nested braces.
fn innermost_group(text: &str) -> Option<(usize, usize)> {
    let mut open: Option<usize> = None;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'{' => open = Some(i),
            b'}' => {
                match open {
                    // Skip empty "{}" groups.
                    Some(start) if i > start + 1 => return Some((start, i)),
                    _ => open = None,
                }
            },
            _ => {},
        }
    }
    None
}

/// Replace the `{name}` placeholder (ASCII case-insensitive) with `name`.
pub fn personalize(text: &str, name: &str) -> String {
    let pat = NAME_PLACEHOLDER.as_bytes();
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + name.len());
    let mut cursor = 0;
    while cursor < text.len() {
        // The placeholder is pure ASCII, so a byte-level match can only start
        // on a char boundary.
        if cursor + pat.len() <= bytes.len()
            && bytes[cursor..cursor + pat.len()].eq_ignore_ascii_case(pat)
        {
            out.push_str(name);
            cursor += pat.len();
        } else if let Some(ch) = text[cursor..].chars().next() {
            out.push(ch);
            cursor += ch.len_utf8();
        } else {
            break;
        }
    }
    out
}

/// Full content rendering for one target: personalize, append the footer,
/// then expand spintax so every recipient gets distinct text.
pub fn render_message(text: &str, name: &str, footer: Option<&str>) -> String {
    let mut message = personalize(text, name);
    if let Some(footer) = footer.filter(|f| !f.is_empty()) {
        message.push_str("\n\n");
        message.push_str(footer);
    }
    expand_spintax(&message)
}

/// Operator preview: render with a sample recipient name.
pub fn preview(text: &str) -> String {
    render_message(text, PREVIEW_NAME, None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn spintax_picks_exactly_one_alternative() {
        for _ in 0..50 {
            let out = expand_spintax("Hi {Bob|Sam}");
            assert!(out == "Hi Bob" || out == "Hi Sam", "got {out:?}");
        }
    }

    #[test]
    fn spintax_covers_all_alternatives_over_many_samples() {
        let seen: HashSet<String> = (0..200).map(|_| expand_spintax("{a|b|c}")).collect();
        assert_eq!(
            seen,
            HashSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn sequential_groups_get_independent_picks() {
        let out = expand_spintax("{Hello|Hi} {there|friend}!");
        assert!(!out.contains('{') && !out.contains('}'), "got {out:?}");
        let words: Vec<&str> = out.trim_end_matches('!').split(' ').collect();
        assert!(["Hello", "Hi"].contains(&words[0]));
        assert!(["there", "friend"].contains(&words[1]));
    }

    #[test]
    fn alternatives_are_trimmed() {
        let out = expand_spintax("{ yes | no }");
        assert!(out == "yes" || out == "no", "got {out:?}");
    }

    #[test]
    fn unmatched_braces_are_left_alone() {
        assert_eq!(expand_spintax("a { b"), "a { b");
        assert_eq!(expand_spintax("a } b"), "a } b");
        assert_eq!(expand_spintax("{}"), "{}");
    }

    #[test]
    fn personalize_is_case_insensitive() {
        assert_eq!(personalize("Hi {name}!", "Ana"), "Hi Ana!");
        assert_eq!(personalize("Hi {NAME}, {Name}", "Ana"), "Hi Ana, Ana");
        assert_eq!(personalize("Hi {name}", ""), "Hi ");
    }

    #[test]
    fn preview_uses_the_sample_name() {
        let out = preview("Hi {name}, {today|now}");
        assert!(out == "Hi Budi, today" || out == "Hi Budi, now", "got {out:?}");
    }

    #[test]
    fn footer_is_appended_before_expansion() {
        let out = render_message("Hello {name}", "Ana", Some("-- {Team|Sales}"));
        assert!(out.starts_with("Hello Ana\n\n-- "));
        assert!(out.ends_with("Team") || out.ends_with("Sales"));
    }

    #[test]
    fn shuffle_preserves_the_multiset() {
        let original: Vec<Target> = (0..1000)
            .map(|i| Target::new(format!("62{i:04}"), ""))
            .collect();
        let mut shuffled = original.clone();
        shuffle_targets(&mut shuffled);

        assert_eq!(shuffled.len(), original.len());
        let mut a = original.clone();
        let mut b = shuffled.clone();
        a.sort_by(|x, y| x.raw.cmp(&y.raw));
        b.sort_by(|x, y| x.raw.cmp(&y.raw));
        assert_eq!(a, b);
        // With 1000 elements an identical order is vanishingly unlikely.
        assert_ne!(original, shuffled);
    }

    #[test]
    fn delay_stays_within_bounds() {
        let pacing = Pacing {
            min_delay_secs: 2,
            max_delay_secs: 4,
            ..Default::default()
        };
        for _ in 0..100 {
            let d = pacing.random_delay().as_secs();
            assert!((2..=4).contains(&d));
        }
        let degenerate = Pacing {
            min_delay_secs: 0,
            max_delay_secs: 0,
            ..Default::default()
        };
        assert_eq!(degenerate.random_delay(), Duration::ZERO);
    }

    #[test]
    fn batch_rest_cadence() {
        let pacing = Pacing {
            batch_size: 3,
            ..Default::default()
        };
        assert!(!pacing.batch_rest_due(0));
        assert!(!pacing.batch_rest_due(2));
        assert!(pacing.batch_rest_due(3));
        assert!(!pacing.batch_rest_due(4));
        assert!(pacing.batch_rest_due(6));

        let disabled = Pacing::default();
        assert!(!disabled.batch_rest_due(5));
    }

    #[test]
    fn typing_duration_is_clamped() {
        assert_eq!(typing_duration(0), Duration::from_secs(2));
        assert_eq!(typing_duration(50), Duration::from_secs(5));
        assert_eq!(typing_duration(10_000), Duration::from_secs(10));
    }
}
