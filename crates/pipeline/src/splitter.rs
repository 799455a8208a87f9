//! Smart sentence splitter
//!
//! Converts the token-by-token fragments a chat model emits into segments
//! suitable for speech. Markup characters are stripped as fragments arrive;
//! sentence-level hygiene (link syntax, URL sentences, control sentinels)
//! runs when a candidate sentence is cut from the buffer.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use parley_core::TextSegment;

/// Characters stripped from every fragment before buffering
const MARKUP_CHARS: &[char] = &['*', '_', '`', '#'];

/// Sentence-ending punctuation, ASCII and fullwidth
const SENTENCE_END: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';'];

/// Pause punctuation usable as a split point once the buffer grows long
const PAUSE: &[char] = &[',', '，'];

/// Inline link syntax; the visible text is kept, the target dropped
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").expect("link regex"));

/// Unspeakable content: explicit schemes or bare hostnames
static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://\S+|\b[a-z0-9][a-z0-9.\-]*\.(com|org|net|io|gov|edu)\b")
        .expect("url regex")
});

/// End-of-conversation sentinel in its surviving spellings. Markup stripping
/// removes underscores first, so `END_CONVERSATION` arrives here as
/// `ENDCONVERSATION`; the underscore variant is matched anyway.
static SENTINEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(?\s*END[\s_]?CONVERSATION\s*\)?").expect("sentinel regex"));

/// Result of one `ingest`/`flush` call
#[derive(Debug, Default)]
pub struct SplitOutput {
    pub segments: Vec<TextSegment>,
    /// A control sentinel was stripped from the text
    pub saw_end_sentinel: bool,
}

/// Streaming sentence splitter
///
/// Never fails; a call may produce zero segments while text accumulates.
#[derive(Debug)]
pub struct SentenceSplitter {
    buffer: String,
    turn: u64,
    next_seq: u64,
    min_chunk: usize,
    max_chunk: usize,
    comma_threshold: usize,
}

impl SentenceSplitter {
    pub fn new(min_chunk: usize, max_chunk: usize, comma_threshold: usize) -> Self {
        Self {
            buffer: String::new(),
            turn: 0,
            next_seq: 0,
            min_chunk,
            max_chunk,
            comma_threshold,
        }
    }

    /// Start a new turn: clear the buffer and restart sequences at 0
    pub fn begin_turn(&mut self, turn: u64) {
        self.buffer.clear();
        self.turn = turn;
        self.next_seq = 0;
    }

    /// Drop any buffered text without emitting it
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn buffer_is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Segments emitted so far this turn
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }

    /// Feed one fragment of model output
    pub fn ingest(&mut self, fragment: &str) -> SplitOutput {
        let cleaned = strip_markup(fragment);
        self.buffer.push_str(&cleaned);

        let mut out = SplitOutput::default();
        self.drain_boundaries(&mut out);
        out
    }

    /// End of turn: emit whatever remains, even below the minimum length
    pub fn flush(&mut self) -> SplitOutput {
        let mut out = SplitOutput::default();
        self.drain_boundaries(&mut out);

        let remainder = std::mem::take(&mut self.buffer);
        let remainder = remainder.trim();
        if !remainder.is_empty() {
            self.emit(remainder, &mut out);
        }

        if let Some(last) = out.segments.last_mut() {
            last.is_final = true;
        }
        out
    }

    /// Cut segments at every boundary currently in the buffer
    fn drain_boundaries(&mut self, out: &mut SplitOutput) {
        // Candidates below min_chunk are not cut; the search resumes past
        // them so they merge into the following segment.
        let mut search_from = 0;

        loop {
            let Some(cut) = self.find_boundary(search_from) else {
                break;
            };

            let candidate = &self.buffer[..cut];
            let too_short = candidate.trim().chars().count() < self.min_chunk;

            if too_short {
                if cut < self.buffer.len() {
                    search_from = cut;
                    continue;
                }
                break;
            }

            let candidate = candidate.trim().to_string();
            self.buffer.drain(..cut);
            search_from = 0;
            self.emit(&candidate, out);
        }
    }

    /// Find the byte index to cut at, searching from `from` onward
    fn find_boundary(&self, from: usize) -> Option<usize> {
        // Strongest class first: sentence-ending punctuation.
        if let Some(cut) = self.sentence_cut(from) {
            return Some(self.absorb_whitespace(cut));
        }

        let total_chars = self.buffer.chars().count();

        // A pause character is acceptable once the buffer is long; the pause
        // closest to the end wins.
        if total_chars > self.comma_threshold {
            if let Some(cut) = self.buffer[from..]
                .char_indices()
                .filter(|(_, c)| PAUSE.contains(c))
                .map(|(i, c)| from + i + c.len_utf8())
                .last()
            {
                return Some(self.absorb_whitespace(cut));
            }
        }

        // Hard cap: force a cut at the last word boundary before the cap, or
        // at the cap itself for text without word breaks.
        if total_chars > self.max_chunk {
            let cap_byte = self
                .buffer
                .char_indices()
                .nth(self.max_chunk)
                .map(|(i, _)| i)
                .unwrap_or(self.buffer.len());
            if from >= cap_byte {
                return None;
            }

            let cut = self.buffer[from..cap_byte]
                .char_indices()
                .filter(|(_, c)| c.is_whitespace())
                .map(|(i, c)| from + i + c.len_utf8())
                .last()
                .unwrap_or(cap_byte);
            return Some(cut);
        }

        None
    }

    /// First sentence-ending punctuation at or after `from`
    fn sentence_cut(&self, from: usize) -> Option<usize> {
        for (i, c) in self.buffer[from..].char_indices() {
            if !SENTENCE_END.contains(&c) {
                continue;
            }
            let end = from + i + c.len_utf8();
            if c == '.' {
                // A period glued to a following alphanumeric (URLs, decimals,
                // version strings) is not a sentence end. At end-of-buffer
                // the follower is unknown, so wait for more text; the flush
                // at end of turn picks it up either way.
                match self.buffer[end..].chars().next() {
                    Some(next) if !next.is_alphanumeric() => {}
                    _ => continue,
                }
            }
            return Some(end);
        }
        None
    }

    /// Extend a cut over any whitespace that directly follows it
    fn absorb_whitespace(&self, cut: usize) -> usize {
        let trailing = self.buffer[cut..]
            .char_indices()
            .take_while(|(_, c)| c.is_whitespace())
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        cut + trailing
    }

    /// Apply sentence-level hygiene and emit a segment
    fn emit(&mut self, text: &str, out: &mut SplitOutput) {
        let mut text = LINK_RE.replace_all(text, "$1").into_owned();

        if SENTINEL_RE.is_match(&text) {
            out.saw_end_sentinel = true;
            text = SENTINEL_RE.replace_all(&text, "").into_owned();
        }

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if URL_RE.is_match(text) {
            debug!(sentence = %text, "dropping unspeakable sentence");
            return;
        }

        out.segments.push(TextSegment {
            turn: self.turn,
            sequence: self.next_seq,
            text: text.to_string(),
            is_final: false,
        });
        self.next_seq += 1;
    }
}

/// Strip unspeakable markup characters from a fragment
///
/// Also applied to the transcript form of assistant text, so the spoken
/// segments and the recorded reply agree.
pub fn strip_markup(fragment: &str) -> String {
    fragment
        .chars()
        .filter(|c| !MARKUP_CHARS.contains(c))
        .collect()
}

/// Expand configured acronyms on word boundaries
///
/// Applied to the spoken text just before synthesis; the segment text itself
/// keeps the unexpanded form.
pub fn expand_acronyms(text: &str, table: &[(String, String)]) -> String {
    let mut result = text.to_string();
    for (abbr, full) in table {
        result = replace_word(&result, abbr, full);
    }
    result
}

fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    if word.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(word) {
        let boundary_before = rest[..pos]
            .chars()
            .last()
            .map_or(true, |c| !c.is_ascii_alphabetic());
        let after = &rest[pos + word.len()..];
        let boundary_after = after
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_alphabetic());

        out.push_str(&rest[..pos]);
        if boundary_before && boundary_after {
            out.push_str(replacement);
        } else {
            out.push_str(word);
        }
        rest = after;
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> SentenceSplitter {
        let mut s = SentenceSplitter::new(3, 150, 40);
        s.begin_turn(1);
        s
    }

    fn texts(out: &SplitOutput) -> Vec<String> {
        out.segments.iter().map(|s| s.text.clone()).collect()
    }

    #[test]
    fn test_splits_on_sentence_punctuation() {
        let mut s = splitter();
        let out = s.ingest("今天天气真不错。我们去公园散步吧！好的？");
        assert_eq!(
            texts(&out),
            vec!["今天天气真不错。", "我们去公园散步吧！", "好的？"]
        );
    }

    #[test]
    fn test_sequences_dense_from_zero() {
        let mut s = splitter();
        let out = s.ingest("One. Two! Three?");
        let seqs: Vec<u64> = out.segments.iter().map(|seg| seg.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_waits_for_boundary() {
        let mut s = splitter();
        assert!(s.ingest("no punctuation yet").segments.is_empty());

        let mut collected = texts(&s.ingest(" and now there is."));
        collected.extend(texts(&s.flush()));
        assert_eq!(collected, vec!["no punctuation yet and now there is."]);
    }

    #[test]
    fn test_char_by_char_matches_one_shot() {
        let input = "你好，我是AI助手。今天天气很好！你想做什么呢？";

        let mut one_shot = splitter();
        let mut expected = texts(&one_shot.ingest(input));
        expected.extend(texts(&one_shot.flush()));

        let mut streamed = splitter();
        let mut got = Vec::new();
        for c in input.chars() {
            got.extend(texts(&streamed.ingest(&c.to_string())));
        }
        got.extend(texts(&streamed.flush()));

        assert_eq!(got, expected);
        assert_eq!(got.concat(), input);
    }

    #[test]
    fn test_char_by_char_matches_one_shot_ascii() {
        let input = "First things first. Then, after a while, a second thought! Done?";

        let mut one_shot = splitter();
        let mut expected = texts(&one_shot.ingest(input));
        expected.extend(texts(&one_shot.flush()));

        let mut streamed = splitter();
        let mut got = Vec::new();
        for c in input.chars() {
            got.extend(texts(&streamed.ingest(&c.to_string())));
        }
        got.extend(texts(&streamed.flush()));

        assert_eq!(got, expected);
    }

    #[test]
    fn test_period_inside_number_is_not_a_boundary() {
        let mut s = splitter();
        let mut collected = texts(&s.ingest("根号2约等于1.414。大概就是这样。"));
        collected.extend(texts(&s.flush()));
        assert_eq!(collected, vec!["根号2约等于1.414。", "大概就是这样。"]);
    }

    #[test]
    fn test_short_sentence_merges_forward() {
        let mut s = splitter();
        // "好。" is below min_chunk, so it rides along with the next sentence.
        let out = s.ingest("好。今天去哪里玩？");
        assert_eq!(texts(&out), vec!["好。今天去哪里玩？"]);
    }

    #[test]
    fn test_flush_emits_below_minimum() {
        let mut s = splitter();
        s.ingest("嗯");
        let out = s.flush();
        assert_eq!(texts(&out), vec!["嗯"]);
        assert!(out.segments[0].is_final);
    }

    #[test]
    fn test_flush_marks_final_once() {
        let mut s = splitter();
        s.ingest("First sentence. Second part");
        let out = s.flush();
        let finals: Vec<bool> = out.segments.iter().map(|seg| seg.is_final).collect();
        assert_eq!(finals, vec![true]);
        assert_eq!(texts(&out), vec!["Second part"]);
    }

    #[test]
    fn test_comma_split_after_threshold() {
        let mut s = splitter();
        let long = "这是一个没有句号的很长很长的句子我们继续加字数直到超过阈值为止，然后又继续说了一些别的";
        let out = s.ingest(long);
        assert_eq!(out.segments.len(), 1);
        assert!(out.segments[0].text.ends_with('，'));
    }

    #[test]
    fn test_exactly_max_chunk_stays_whole() {
        let mut s = splitter();
        let input: String = "字".repeat(150);
        assert!(s.ingest(&input).segments.is_empty());

        let out = s.flush();
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].text.chars().count(), 150);
    }

    #[test]
    fn test_over_max_chunk_splits_at_cap() {
        let mut s = splitter();
        let input: String = "字".repeat(151);
        let out = s.ingest(&input);
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].text.chars().count(), 150);

        let rest = s.flush();
        assert_eq!(rest.segments[0].text.chars().count(), 1);
    }

    #[test]
    fn test_over_max_chunk_prefers_word_boundary() {
        let mut s = splitter();
        let word = "word ";
        let input: String = word.repeat(31); // 155 chars, breaks every 5
        let out = s.ingest(&input);
        assert!(!out.segments.is_empty());
        let first = &out.segments[0].text;
        assert!(first.chars().count() <= 150);
        assert!(first.ends_with("word"));
    }

    #[test]
    fn test_markdown_stripped() {
        let mut s = splitter();
        let out = s.ingest("**Bold** and `code` and # heading done!");
        assert_eq!(texts(&out), vec!["Bold and code and  heading done!"]);
    }

    #[test]
    fn test_link_keeps_visible_text() {
        let mut s = splitter();
        let out = s.ingest("See [the docs](https://docs.rs/tokio) for details!");
        assert_eq!(texts(&out), vec!["See the docs for details!"]);
    }

    #[test]
    fn test_url_sentence_dropped() {
        let mut s = splitter();
        let out = s.ingest("请访问 https://example.com 查看。这句没有链接。");
        assert_eq!(texts(&out), vec!["这句没有链接。"]);
        // The dropped sentence still consumed no sequence number.
        assert_eq!(out.segments[0].sequence, 0);
    }

    #[test]
    fn test_bare_hostname_dropped() {
        let mut s = splitter();
        let mut collected = texts(&s.ingest("You can search example.org for that. Next one."));
        collected.extend(texts(&s.flush()));
        assert_eq!(collected, vec!["Next one."]);
    }

    #[test]
    fn test_sentinel_stripped_and_flagged() {
        let mut s = splitter();
        s.ingest("好的，再见！");
        let out = s.ingest("(END_CONVERSATION)");
        assert!(!out.saw_end_sentinel);

        let out = s.flush();
        assert!(out.saw_end_sentinel);
        assert!(out.segments.is_empty());
    }

    #[test]
    fn test_sentinel_variants() {
        for variant in [
            "END_CONVERSATION",
            "ENDCONVERSATION",
            "END CONVERSATION",
            "(END_CONVERSATION)",
        ] {
            let mut s = splitter();
            let out = s.ingest(&format!("好的再见{}。", variant));
            assert!(out.saw_end_sentinel, "variant {variant} not detected");
            for seg in &out.segments {
                assert!(!seg.text.to_uppercase().contains("CONVERSATION"));
            }
        }
    }

    #[test]
    fn test_begin_turn_resets_sequence() {
        let mut s = splitter();
        s.ingest("First turn sentence.  ");
        assert_eq!(s.emitted(), 1);

        s.begin_turn(2);
        let out = s.ingest("Second turn sentence! ");
        assert_eq!(out.segments[0].sequence, 0);
        assert_eq!(out.segments[0].turn, 2);
    }

    #[test]
    fn test_expand_acronyms_word_boundaries() {
        let table = vec![
            ("AI".to_string(), "A I".to_string()),
            ("API".to_string(), "A P I".to_string()),
        ];
        assert_eq!(expand_acronyms("AI is here", &table), "A I is here");
        assert_eq!(expand_acronyms("我是AI助手", &table), "我是A I助手");
        // Embedded in a word: untouched.
        assert_eq!(expand_acronyms("SAID", &table), "SAID");
        assert_eq!(expand_acronyms("the API.", &table), "the A P I.");
    }
}
