use crate::logs::{ChannelLog, MessageRecord};
use crate::scanner::counter::{CounterMap, Weights};
use crate::scanner::report::{channel_mention, plural, role_mention, user_mention, RankedEntry, Report};
use crate::scanner::text;
use crate::scanner::{MemberFilter, ScanSummary, Scanner};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Author is counted: any human by default, or explicitly selected members.
fn counts_author(message: &MessageRecord, members: &MemberFilter, include_bots: bool) -> bool {
    (members.is_all() && (!message.is_bot || include_bots)) || members.selects(message.author_id)
}

fn per_message(total: u64, summary: &ScanSummary) -> f64 {
    if summary.matched_messages == 0 {
        0.0
    } else {
        total as f64 / summary.matched_messages as f64
    }
}

fn total_footer(total: u64, summary: &ScanSummary) -> String {
    format!(
        "Total: {} ({:.2}/msg)",
        plural(total, "time"),
        per_message(total, summary)
    )
}

fn entries<K: Ord>(
    counters: &CounterMap<K>,
    top: usize,
    weights: Weights,
    now: DateTime<Utc>,
    label: impl Fn(&K) -> String,
    item_label: impl Fn(u64) -> String,
) -> Vec<RankedEntry> {
    let total = counters.total_usages();
    counters
        .ranked_weighted(top, weights, now)
        .into_iter()
        .map(|(key, counter)| RankedEntry::from_counter(label(key), counter, total, &item_label))
        .collect()
}

/// Ranks authors by messages written, split per channel. Reactions their
/// messages received are shown but do not weigh in the rank.
#[derive(Debug, Default)]
pub struct MessagesScanner {
    top: usize,
    include_bots: bool,
    authors: CounterMap<u64>,
}

impl MessagesScanner {
    pub fn new(top: usize, include_bots: bool) -> Self {
        Self {
            top,
            include_bots,
            authors: CounterMap::new(),
        }
    }
}

impl Scanner for MessagesScanner {
    fn visit(&mut self, channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter) -> bool {
        if !counts_author(message, members, self.include_bots) {
            return false;
        }
        let counter = self.authors.get_or_insert(message.author_id);
        counter.update_use(1, message.created_at, channel.channel_id);
        let reactions = message.reaction_count() as u64;
        if reactions > 0 {
            counter.add_reactions(reactions, message.created_at);
        }
        true
    }

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report {
        Report {
            title: "Messages".to_string(),
            counted: "message",
            summary: *summary,
            total_usages: self.authors.total_usages(),
            entries: entries(
                &self.authors,
                self.top,
                Weights::USAGES_ONLY,
                now,
                |id| user_mention(*id),
                |channel| format!(" in {}", channel_mention(channel)),
            ),
            footer: None,
        }
    }
}

/// Ranks channels by messages, split per author.
#[derive(Debug, Default)]
pub struct ChannelsScanner {
    top: usize,
    include_bots: bool,
    channels: CounterMap<u64>,
}

impl ChannelsScanner {
    pub fn new(top: usize, include_bots: bool) -> Self {
        Self {
            top,
            include_bots,
            channels: CounterMap::new(),
        }
    }
}

impl Scanner for ChannelsScanner {
    fn visit(&mut self, channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter) -> bool {
        if !counts_author(message, members, self.include_bots) {
            return false;
        }
        self.channels
            .get_or_insert(channel.channel_id)
            .update_use(1, message.created_at, message.author_id);
        true
    }

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report {
        Report {
            title: "Channels".to_string(),
            counted: "message",
            summary: *summary,
            total_usages: self.channels.total_usages(),
            entries: entries(
                &self.channels,
                self.top,
                Weights::USAGES_ONLY,
                now,
                |id| channel_mention(*id),
                |author| format!(" by {}", user_mention(author)),
            ),
            footer: None,
        }
    }
}

/// Ranks members by reactions given, split per channel.
///
/// Every scanned message counts as matched, whether it was reacted to or not.
#[derive(Debug, Default)]
pub struct ReactionsScanner {
    top: usize,
    reactors: CounterMap<u64>,
}

impl ReactionsScanner {
    pub fn new(top: usize) -> Self {
        Self {
            top,
            reactors: CounterMap::new(),
        }
    }
}

impl Scanner for ReactionsScanner {
    fn visit(&mut self, channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter) -> bool {
        for reactor in message.reactions.values().flatten() {
            if members.contains(*reactor) {
                self.reactors
                    .get_or_insert(*reactor)
                    .update_use(1, message.created_at, channel.channel_id);
            }
        }
        true
    }

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report {
        Report {
            title: "Reactions".to_string(),
            counted: "reaction",
            summary: *summary,
            total_usages: self.reactors.total_usages(),
            entries: entries(
                &self.reactors,
                self.top,
                Weights::default(),
                now,
                |id| user_mention(*id),
                |channel| format!(" in {}", channel_mention(channel)),
            ),
            footer: None,
        }
    }
}

/// Anything a message can mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MentionKey {
    User(u64),
    Role(u64),
    Channel(u64),
    Everyone,
    Here,
}

impl MentionKey {
    pub fn label(&self) -> String {
        match self {
            MentionKey::User(id) => user_mention(*id),
            MentionKey::Role(id) => role_mention(*id),
            MentionKey::Channel(id) => channel_mention(*id),
            // Zero-width space keeps the report from pinging anyone.
            MentionKey::Everyone => "@\u{200b}everyone".to_string(),
            MentionKey::Here => "@\u{200b}here".to_string(),
        }
    }
}

/// Ranks mentioned users, split per author. With `everyone`, role, channel
/// and `@everyone`/`@here` mentions are ranked too.
#[derive(Debug, Default)]
pub struct MentionsScanner {
    top: usize,
    everyone: bool,
    mentions: CounterMap<MentionKey>,
}

impl MentionsScanner {
    pub fn new(top: usize, everyone: bool) -> Self {
        Self {
            top,
            everyone,
            mentions: CounterMap::new(),
        }
    }

    fn count(&mut self, key: MentionKey, count: u64, message: &MessageRecord) {
        if count > 0 {
            self.mentions
                .get_or_insert(key)
                .update_use(count, message.created_at, message.author_id);
        }
    }
}

impl Scanner for MentionsScanner {
    fn visit(&mut self, _channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter) -> bool {
        if !counts_author(message, members, false) {
            return false;
        }
        for user in &message.user_mentions {
            self.count(MentionKey::User(*user), 1, message);
        }
        if self.everyone {
            for role in &message.role_mentions {
                self.count(MentionKey::Role(*role), 1, message);
            }
            for channel in &message.channel_mentions {
                self.count(MentionKey::Channel(*channel), 1, message);
            }
            let everyone = message.content.matches("@everyone").count() as u64;
            let here = message.content.matches("@here").count() as u64;
            self.count(MentionKey::Everyone, everyone, message);
            self.count(MentionKey::Here, here, message);
        }
        true
    }

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report {
        let total = self.mentions.total_usages();
        Report {
            title: "Mentions".to_string(),
            counted: "time",
            summary: *summary,
            total_usages: total,
            entries: entries(
                &self.mentions,
                self.top,
                Weights::default(),
                now,
                MentionKey::label,
                |author| format!(" by {}", user_mention(author)),
            ),
            footer: Some(total_footer(total, summary)),
        }
    }
}

/// Ranks the guild's custom emojis by use in messages and as reactions,
/// split per author. Unicode emojis are ranked too with `all_emojis`.
#[derive(Debug, Default)]
pub struct EmojisScanner {
    top: usize,
    include_bots: bool,
    all_emojis: bool,
    weights: Weights,
    guild_emojis: BTreeSet<String>,
    emojis: CounterMap<String>,
}

impl EmojisScanner {
    /// `guild_emojis` holds custom emojis rendered as `<:name:id>`.
    pub fn new(top: usize, guild_emojis: BTreeSet<String>) -> Self {
        Self {
            top,
            guild_emojis,
            ..Self::default()
        }
    }

    pub fn include_bots(mut self, include_bots: bool) -> Self {
        self.include_bots = include_bots;
        self
    }

    pub fn all_emojis(mut self, all_emojis: bool) -> Self {
        self.all_emojis = all_emojis;
        self
    }

    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    /// Lists guild emojis nobody used, after the used ones.
    pub fn list_unused(mut self, list_unused: bool) -> Self {
        if list_unused {
            for emoji in &self.guild_emojis {
                self.emojis.get_or_insert(emoji.clone());
            }
        }
        self
    }

    fn is_known(&self, emoji: &str) -> bool {
        self.guild_emojis.contains(emoji) || (self.all_emojis && !text::is_custom_emoji(emoji))
    }
}

impl Scanner for EmojisScanner {
    fn visit(&mut self, _channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter) -> bool {
        let impacted = counts_author(message, members, self.include_bots);
        if impacted {
            for emoji in text::emojis(&message.content) {
                if self.is_known(emoji) {
                    self.emojis.get_or_insert(emoji.to_string()).update_use(
                        1,
                        message.created_at,
                        message.author_id,
                    );
                }
            }
        }
        for (emoji, reactors) in &message.reactions {
            if !self.is_known(emoji) {
                continue;
            }
            let count = reactors.iter().filter(|r| members.contains(**r)).count() as u64;
            if count > 0 {
                self.emojis
                    .get_or_insert(emoji.clone())
                    .add_reactions(count, message.created_at);
            }
        }
        impacted
    }

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report {
        let total = self.emojis.total_usages();
        let reactions = self.emojis.total_reactions();
        let mut footer = total_footer(total, summary);
        if reactions > 0 {
            footer.push_str(&format!(" and {}", plural(reactions, "reaction")));
        }
        Report {
            title: "Emojis".to_string(),
            counted: "time",
            summary: *summary,
            total_usages: total,
            entries: entries(
                &self.emojis,
                self.top,
                self.weights,
                now,
                String::clone,
                |author| format!(" by {}", user_mention(author)),
            ),
            footer: Some(footer),
        }
    }
}

/// Ranks words, split per author. A plural or possessive form is counted
/// with its singular when both were written.
#[derive(Debug, Default)]
pub struct WordsScanner {
    top: usize,
    include_bots: bool,
    words: CounterMap<String>,
}

const WORD_SUFFIXES: [&str; 2] = ["'s", "s"];

impl WordsScanner {
    pub fn new(top: usize, include_bots: bool) -> Self {
        Self {
            top,
            include_bots,
            words: CounterMap::new(),
        }
    }

    fn folded(&self) -> CounterMap<String> {
        let mut folded = CounterMap::new();
        for (word, counter) in self.words.iter() {
            let stem = WORD_SUFFIXES.iter().find_map(|suffix| {
                word.strip_suffix(suffix)
                    .filter(|stem| self.words.get(&stem.to_string()).is_some())
            });
            folded
                .get_or_insert(stem.unwrap_or(word.as_str()).to_string())
                .merge(counter);
        }
        folded
    }
}

impl Scanner for WordsScanner {
    fn visit(&mut self, _channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter) -> bool {
        if !counts_author(message, members, self.include_bots) {
            return false;
        }
        for word in text::words(&message.content) {
            self.words
                .get_or_insert(word)
                .update_use(1, message.created_at, message.author_id);
        }
        true
    }

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report {
        let words = self.folded();
        let total = words.total_usages();
        Report {
            title: "Words".to_string(),
            counted: "time",
            summary: *summary,
            total_usages: total,
            entries: entries(
                &words,
                self.top,
                Weights::USAGES_ONLY,
                now,
                |word| format!("`{}`", word),
                |author| format!(" by {}", user_mention(author)),
            ),
            footer: Some(total_footer(total, summary)),
        }
    }
}

/// Ranks the members who mention the selected members, split per mentioned
/// member. Without a selection nothing is ranked.
#[derive(Debug, Default)]
pub struct MentionedScanner {
    top: usize,
    include_bots: bool,
    mentioners: CounterMap<u64>,
}

impl MentionedScanner {
    pub fn new(top: usize, include_bots: bool) -> Self {
        Self {
            top,
            include_bots,
            mentioners: CounterMap::new(),
        }
    }
}

impl Scanner for MentionedScanner {
    fn visit(&mut self, _channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter) -> bool {
        let MemberFilter::Only(targets) = members else {
            return false;
        };
        if message.is_bot && !self.include_bots {
            return true;
        }
        for target in targets {
            let count = message.user_mentions.iter().filter(|m| *m == target).count() as u64;
            if count > 0 {
                self.mentioners.get_or_insert(message.author_id).update_use(
                    count,
                    message.created_at,
                    *target,
                );
            }
        }
        true
    }

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report {
        let total = self.mentioners.total_usages();
        Report {
            title: "Mentioned by".to_string(),
            counted: "time",
            summary: *summary,
            total_usages: total,
            entries: entries(
                &self.mentioners,
                self.top,
                Weights::USAGES_ONLY,
                now,
                |id| user_mention(*id),
                |target| format!(" of {}", user_mention(target)),
            ),
            footer: Some(total_footer(total, summary)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::message::tests::record_at;
    use crate::logs::{ChannelRef, GuildArchive};
    use crate::scanner::{run_scan, ScanScope};
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn fixture(now: DateTime<Utc>) -> GuildArchive {
        let mut archive = GuildArchive::new(1);
        let general = archive.get_or_insert(&ChannelRef::new(10, "general"));
        let mut m = record_at(now - Duration::days(1), 0, 1);
        m.user_mentions = vec![2, 2];
        m.content = "<@2> <@2> @everyone".to_string();
        m.reactions.insert("👍".to_string(), BTreeSet::from([2, 3]));
        general.insert(m);
        let mut m = record_at(now - Duration::days(2), 1, 2);
        m.role_mentions = vec![50];
        m.reactions.insert("🔥".to_string(), BTreeSet::from([3]));
        general.insert(m);
        let mut bot = record_at(now - Duration::days(2), 2, 99);
        bot.is_bot = true;
        bot.user_mentions = vec![1];
        general.insert(bot);

        let random = archive.get_or_insert(&ChannelRef::new(11, "random"));
        random.insert(record_at(now - Duration::days(3), 0, 1));
        random.insert(record_at(now, 1, 1));
        archive
    }

    fn scan(scanner: &mut dyn Scanner, members: MemberFilter, channels: Vec<u64>) -> Report {
        let now = Utc::now();
        let archive = fixture(now);
        let scope = ScanScope {
            members,
            ..ScanScope::new(channels)
        };
        let summary = run_scan(&archive, &scope, scanner);
        scanner.report(&summary, now)
    }

    fn labels(report: &Report) -> Vec<&str> {
        report.entries.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn test_messages_scanner() {
        let report = scan(&mut MessagesScanner::new(10, false), MemberFilter::All, vec![10, 11]);
        assert_eq!(labels(&report), vec!["<@1>", "<@2>"]);
        assert_eq!(report.entries[0].usages, 3);
        assert_eq!(report.entries[0].reactions, 2);
        assert_eq!(report.summary.matched_messages, 4);
        assert_eq!(report.summary.total_messages, 5);

        let with_bots = scan(&mut MessagesScanner::new(10, true), MemberFilter::All, vec![10]);
        assert_eq!(with_bots.summary.matched_messages, 3);

        let only_bot = scan(
            &mut MessagesScanner::new(10, false),
            MemberFilter::from_members([99]),
            vec![10],
        );
        assert_eq!(labels(&only_bot), vec!["<@99>"]);
    }

    #[test]
    fn test_channels_scanner() {
        let report = scan(&mut ChannelsScanner::new(1, false), MemberFilter::All, vec![10, 11]);
        // Both channels hold two human messages; the most recent wins the tie.
        assert_eq!(labels(&report), vec!["<#11>"]);
        assert_eq!(report.total_usages, 4);
    }

    #[test]
    fn test_reactions_scanner() {
        let report = scan(&mut ReactionsScanner::new(10), MemberFilter::All, vec![10, 11]);
        assert_eq!(labels(&report), vec!["<@3>", "<@2>"]);
        assert_eq!(report.entries[0].usages, 2);
        assert_eq!(report.summary.matched_messages, 5);

        let only = scan(
            &mut ReactionsScanner::new(10),
            MemberFilter::from_members([2]),
            vec![10],
        );
        assert_eq!(labels(&only), vec!["<@2>"]);
    }

    #[test]
    fn test_mentions_scanner() {
        let report = scan(&mut MentionsScanner::new(10, false), MemberFilter::All, vec![10]);
        assert_eq!(labels(&report), vec!["<@2>"]);
        assert_eq!(report.entries[0].usages, 2);

        let all = scan(&mut MentionsScanner::new(10, true), MemberFilter::All, vec![10]);
        assert_eq!(labels(&all), vec!["<@2>", "@\u{200b}everyone", "<@&50>"]);
        assert!(all.footer.unwrap().starts_with("Total: 4 times"));
    }

    #[test]
    fn test_results_do_not_depend_on_walk_order() {
        let forward = scan(&mut MessagesScanner::new(10, true), MemberFilter::All, vec![10, 11]);
        let backward = scan(&mut MessagesScanner::new(10, true), MemberFilter::All, vec![11, 10]);
        assert_eq!(forward.entries, backward.entries);
        assert_eq!(forward.summary, backward.summary);

        let forward = scan(&mut MentionsScanner::new(10, true), MemberFilter::All, vec![10, 11]);
        let backward = scan(&mut MentionsScanner::new(10, true), MemberFilter::All, vec![11, 10]);
        assert_eq!(forward.entries, backward.entries);
    }

    fn emoji_fixture(now: DateTime<Utc>) -> GuildArchive {
        let mut archive = GuildArchive::new(1);
        let general = archive.get_or_insert(&ChannelRef::new(10, "general"));
        let mut m = record_at(now - Duration::days(2), 0, 1);
        m.content = "hi <:party:5> <:party:5> \u{1f44d} <:elsewhere:9>".to_string();
        m.reactions
            .insert("<:party:5>".to_string(), BTreeSet::from([2, 3]));
        m.reactions.insert("\u{1f525}".to_string(), BTreeSet::from([2]));
        general.insert(m);
        let mut m = record_at(now - Duration::days(1), 1, 2);
        m.content = "<a:dance:6>".to_string();
        general.insert(m);
        let mut bot = record_at(now, 2, 99);
        bot.is_bot = true;
        bot.content = "<:party:5>".to_string();
        general.insert(bot);
        archive
    }

    fn guild_emojis() -> BTreeSet<String> {
        ["<:party:5>", "<a:dance:6>", "<:unused:7>"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn scan_emojis(scanner: EmojisScanner, members: MemberFilter) -> Report {
        let now = Utc::now();
        let archive = emoji_fixture(now);
        let mut scanner = scanner;
        let scope = ScanScope {
            members,
            ..ScanScope::new(vec![10])
        };
        let summary = run_scan(&archive, &scope, &mut scanner);
        scanner.report(&summary, now)
    }

    #[test]
    fn test_emojis_scanner() {
        let report = scan_emojis(EmojisScanner::new(10, guild_emojis()), MemberFilter::All);
        assert_eq!(labels(&report), vec!["<:party:5>", "<a:dance:6>"]);
        assert_eq!(report.entries[0].usages, 2);
        assert_eq!(report.entries[0].reactions, 2);
        assert_eq!(report.summary.matched_messages, 2);
        let footer = report.footer.unwrap();
        assert!(footer.starts_with("Total: 3 times"), "{}", footer);
        assert!(footer.ends_with("and 2 reactions"), "{}", footer);

        let listed = scan_emojis(
            EmojisScanner::new(10, guild_emojis()).list_unused(true),
            MemberFilter::All,
        );
        assert_eq!(
            labels(&listed),
            vec!["<:party:5>", "<a:dance:6>", "<:unused:7>"]
        );

        let with_bots = scan_emojis(
            EmojisScanner::new(10, guild_emojis()).include_bots(true),
            MemberFilter::All,
        );
        assert_eq!(with_bots.entries[0].usages, 3);
    }

    #[test]
    fn test_emojis_scanner_unicode_and_sorting() {
        let report = scan_emojis(
            EmojisScanner::new(10, guild_emojis())
                .all_emojis(true)
                .weights(Weights::REACTIONS_ONLY),
            MemberFilter::All,
        );
        // Foreign custom emojis are never ranked.
        assert!(!labels(&report).contains(&"<:elsewhere:9>"));
        assert_eq!(labels(&report)[..2], ["<:party:5>", "\u{1f525}"]);
        assert!(labels(&report).contains(&"\u{1f44d}"));
    }

    #[test]
    fn test_emojis_scanner_counts_selected_reactors() {
        let report = scan_emojis(
            EmojisScanner::new(10, guild_emojis()),
            MemberFilter::from_members([3]),
        );
        assert_eq!(report.summary.matched_messages, 0);
        assert_eq!(labels(&report), vec!["<:party:5>"]);
        assert_eq!(report.entries[0].usages, 0);
        assert_eq!(report.entries[0].reactions, 1);
    }

    #[test]
    fn test_words_scanner_folds_plurals() {
        let now = Utc::now();
        let mut archive = GuildArchive::new(1);
        let general = archive.get_or_insert(&ChannelRef::new(10, "general"));
        for (seq, author, days, content) in [
            (0, 1, 2, "cats cat dog"),
            (1, 2, 1, "Cat's dog, dog!"),
            (2, 3, 1, "dogs"),
        ] {
            let mut m = record_at(now - Duration::days(days), seq, author);
            m.content = content.to_string();
            general.insert(m);
        }
        let mut bot = record_at(now, 3, 99);
        bot.is_bot = true;
        bot.content = "cat cat cat cat".to_string();
        general.insert(bot);

        let mut scanner = WordsScanner::new(10, false);
        let summary = run_scan(&archive, &ScanScope::new(vec![10]), &mut scanner);
        let report = scanner.report(&summary, now);

        assert_eq!(labels(&report), vec!["`dog`", "`cat`"]);
        assert_eq!(report.entries[0].usages, 4);
        assert_eq!(report.entries[1].usages, 3);
        assert_eq!(report.total_usages, 7);
        assert_eq!(summary.matched_messages, 3);
    }

    #[test]
    fn test_mentioned_scanner() {
        let now = Utc::now();
        let mut archive = GuildArchive::new(1);
        let general = archive.get_or_insert(&ChannelRef::new(10, "general"));
        let mut m = record_at(now - Duration::days(1), 0, 1);
        m.user_mentions = vec![2, 2, 3];
        general.insert(m);
        let mut m = record_at(now, 1, 4);
        m.user_mentions = vec![2];
        general.insert(m);
        let mut bot = record_at(now, 2, 99);
        bot.is_bot = true;
        bot.user_mentions = vec![2, 2, 2];
        general.insert(bot);

        let scan = |members: MemberFilter| {
            let mut scanner = MentionedScanner::new(10, false);
            let scope = ScanScope {
                members,
                ..ScanScope::new(vec![10])
            };
            let summary = run_scan(&archive, &scope, &mut scanner);
            scanner.report(&summary, now)
        };

        let report = scan(MemberFilter::from_members([2]));
        assert_eq!(labels(&report), vec!["<@1>", "<@4>"]);
        assert_eq!(report.entries[0].usages, 2);
        assert_eq!(report.entries[0].top_item.as_ref().unwrap().label, " of <@2>");

        let both = scan(MemberFilter::from_members([2, 3]));
        assert_eq!(both.entries[0].usages, 3);

        let nobody = scan(MemberFilter::All);
        assert_eq!(nobody.summary.matched_messages, 0);
        assert!(nobody.entries.is_empty());
    }
}
