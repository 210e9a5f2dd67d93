use crate::scanner::counter::Counter;
use crate::scanner::ScanSummary;
use chrono::{DateTime, Utc};

/// Discord refuses messages longer than this.
pub const MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct TopItem {
    pub label: String,
    pub count: u64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub label: String,
    pub usages: u64,
    pub reactions: u64,
    /// Part of all usages of the report.
    pub share: f64,
    pub last_used: Option<DateTime<Utc>>,
    pub top_item: Option<TopItem>,
}

impl RankedEntry {
    pub fn from_counter(
        label: String,
        counter: &Counter,
        total_usages: u64,
        item_label: impl Fn(u64) -> String,
    ) -> Self {
        let usages = counter.all_usages();
        let top_item = counter.top_item().map(|(item, count)| TopItem {
            label: item_label(item),
            count,
            share: ratio(count, usages),
        });
        Self {
            label,
            usages,
            reactions: counter.reactions(),
            share: ratio(usages, total_usages),
            last_used: counter.last_used(),
            top_item,
        }
    }
}

/// Ranked result of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    /// Unit of a usage, singular ("message", "reaction"...).
    pub counted: &'static str,
    pub summary: ScanSummary,
    pub total_usages: u64,
    pub entries: Vec<RankedEntry>,
    pub footer: Option<String>,
}

impl Report {
    pub fn render(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.entries.len() + 2);
        lines.push(format!(
            "**{}** in {} ({} scanned)",
            self.title,
            plural(self.summary.matched_channels as u64, "channel"),
            plural(self.summary.matched_messages as u64, "message"),
        ));
        for (i, entry) in self.entries.iter().enumerate() {
            lines.push(self.render_entry(i, entry, now));
        }
        if let Some(footer) = &self.footer {
            lines.push(footer.clone());
        }
        lines
    }

    fn render_entry(&self, i: usize, entry: &RankedEntry, now: DateTime<Utc>) -> String {
        let mut out = format!(
            "{} {} - {} ({})",
            place(i),
            entry.label,
            plural(entry.usages, self.counted),
            percent(entry.share)
        );
        if entry.reactions > 0 {
            out.push_str(&format!(" and {}", plural(entry.reactions, "reaction")));
        }
        out.push_str(&format!(" (last {})", from_now(entry.last_used, now)));
        if let Some(top) = &entry.top_item {
            if top.count == entry.usages {
                out.push_str(&format!(" (all{})", top.label));
            } else {
                out.push_str(&format!(
                    " ({}{}, {})",
                    top.count,
                    top.label,
                    percent(top.share)
                ));
            }
        }
        out
    }

    /// Rendered lines packed into messages of at most `limit` characters.
    pub fn render_chunks(&self, now: DateTime<Utc>, limit: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        for line in self.render(now) {
            let line: String = line.chars().take(limit).collect();
            if !current.is_empty() && current.chars().count() + 1 + line.chars().count() > limit {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&line);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn place(i: usize) -> String {
    match i {
        0 => ":first_place:".to_string(),
        1 => ":second_place:".to_string(),
        2 => ":third_place:".to_string(),
        _ => format!("**#{}**", i + 1),
    }
}

pub fn plural(count: u64, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

pub fn percent(share: f64) -> String {
    format!("{:.0}%", share * 100.0)
}

pub fn from_now(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(date) = date else {
        return "never".to_string();
    };
    match (now - date).num_days() {
        i64::MIN..=0 => "today".to_string(),
        1 => "yesterday".to_string(),
        days => format!("{} days ago", days),
    }
}

pub fn user_mention(id: u64) -> String {
    format!("<@{}>", id)
}

pub fn role_mention(id: u64) -> String {
    format!("<@&{}>", id)
}

pub fn channel_mention(id: u64) -> String {
    format!("<#{}>", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn report(entries: Vec<RankedEntry>) -> Report {
        Report {
            title: "Messages".to_string(),
            counted: "message",
            summary: ScanSummary {
                matched_messages: 12,
                total_messages: 20,
                matched_channels: 2,
            },
            total_usages: 12,
            entries,
            footer: Some("Total: 12 messages".to_string()),
        }
    }

    #[test]
    fn test_entry_from_counter() {
        let now = Utc::now();
        let mut counter = Counter::default();
        counter.update_use(3, now, 10);
        counter.update_use(1, now, 11);

        let entry = RankedEntry::from_counter(user_mention(1), &counter, 8, |id| {
            format!(" in {}", channel_mention(id))
        });
        assert_eq!(entry.usages, 4);
        assert_eq!(entry.share, 0.5);
        let top = entry.top_item.unwrap();
        assert_eq!(top.label, " in <#10>");
        assert_eq!(top.share, 0.75);
    }

    #[test]
    fn test_render_lines() {
        let now = Utc::now();
        let lines = report(vec![
            RankedEntry {
                label: "<@1>".to_string(),
                usages: 8,
                reactions: 0,
                share: 8.0 / 12.0,
                last_used: Some(now),
                top_item: Some(TopItem {
                    label: " in <#3>".to_string(),
                    count: 8,
                    share: 1.0,
                }),
            },
            RankedEntry {
                label: "<@2>".to_string(),
                usages: 4,
                reactions: 2,
                share: 4.0 / 12.0,
                last_used: Some(now - Duration::days(3)),
                top_item: None,
            },
        ])
        .render(now);

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "**Messages** in 2 channels (12 messages scanned)");
        assert_eq!(
            lines[1],
            ":first_place: <@1> - 8 messages (67%) (last today) (all in <#3>)"
        );
        assert_eq!(
            lines[2],
            ":second_place: <@2> - 4 messages (33%) and 2 reactions (last 3 days ago)"
        );
        assert_eq!(lines[3], "Total: 12 messages");
    }

    #[test]
    fn test_chunks_respect_limit() {
        let now = Utc::now();
        let entries = (0..50)
            .map(|i| RankedEntry {
                label: user_mention(i),
                usages: 1,
                reactions: 0,
                share: 0.02,
                last_used: Some(now),
                top_item: None,
            })
            .collect();
        let report = report(entries);
        let chunks = report.render_chunks(now, 300);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 300));
        let rejoined = chunks.join("\n");
        assert_eq!(rejoined, report.render(now).join("\n"));
    }

    #[test]
    fn test_from_now() {
        let now = Utc::now();
        assert_eq!(from_now(None, now), "never");
        assert_eq!(from_now(Some(now + Duration::hours(1)), now), "today");
        assert_eq!(from_now(Some(now - Duration::days(1)), now), "yesterday");
        assert_eq!(from_now(Some(now - Duration::days(9)), now), "9 days ago");
    }
}
