//! Text-based lip sync
//!
//! Fallback producer for speech backends that expose no audio stream at
//! all: approximates lip motion from the utterance text alone. Each
//! character is classified by its phonetic vowel using fixed kana tables,
//! given a nominal 150 ms slot divided by the speech-rate multiplier, and
//! played back as one synthetic band-energy report per character.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::report::{AudioVolumeData, ReportBus};
use crate::engine::mouth::MouthState;

/// Nominal per-character duration before the rate multiplier.
const CHAR_DURATION: Duration = Duration::from_millis(150);

/// Punctuation stripped before classification, alongside whitespace.
const PUNCTUATION: [char; 5] = ['、', '。', '！', '？', '…'];

/// One classified character of an utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Phoneme {
    pub ch: char,
    pub state: MouthState,
    pub duration: Duration,
}

// Kana rows grouped by vowel, hiragana then katakana.
const ROW_A: &[char] = &[
    'あ', 'か', 'が', 'さ', 'ざ', 'た', 'だ', 'な', 'は', 'ば', 'ぱ', 'ま', 'や', 'ら', 'わ',
    'ア', 'カ', 'ガ', 'サ', 'ザ', 'タ', 'ダ', 'ナ', 'ハ', 'バ', 'パ', 'マ', 'ヤ', 'ラ', 'ワ',
];
const ROW_I: &[char] = &[
    'い', 'き', 'ぎ', 'し', 'じ', 'ち', 'ぢ', 'に', 'ひ', 'び', 'ぴ', 'み', 'り',
    'イ', 'キ', 'ギ', 'シ', 'ジ', 'チ', 'ヂ', 'ニ', 'ヒ', 'ビ', 'ピ', 'ミ', 'リ',
];
const ROW_U: &[char] = &[
    'う', 'く', 'ぐ', 'す', 'ず', 'つ', 'づ', 'ぬ', 'ふ', 'ぶ', 'ぷ', 'む', 'ゆ', 'る',
    'ウ', 'ク', 'グ', 'ス', 'ズ', 'ツ', 'ヅ', 'ヌ', 'フ', 'ブ', 'プ', 'ム', 'ユ', 'ル',
];
const ROW_E: &[char] = &[
    'え', 'け', 'げ', 'せ', 'ぜ', 'て', 'で', 'ね', 'へ', 'べ', 'ぺ', 'め', 'れ',
    'エ', 'ケ', 'ゲ', 'セ', 'ゼ', 'テ', 'デ', 'ネ', 'ヘ', 'ベ', 'ペ', 'メ', 'レ',
];
const ROW_O: &[char] = &[
    'お', 'こ', 'ご', 'そ', 'ぞ', 'と', 'ど', 'の', 'ほ', 'ぼ', 'ぽ', 'も', 'よ', 'ろ', 'を',
    'オ', 'コ', 'ゴ', 'ソ', 'ゾ', 'ト', 'ド', 'ノ', 'ホ', 'ボ', 'ポ', 'モ', 'ヨ', 'ロ', 'ヲ',
];

/// Mouth shape for a single character.
pub fn classify_char(ch: char) -> MouthState {
    // Geminate marker: a brief stop
    if ch == 'っ' || ch == 'ッ' {
        return MouthState::Closed;
    }
    // Syllabic nasal
    if ch == 'ん' || ch == 'ン' {
        return MouthState::Half;
    }

    if ROW_A.contains(&ch) || ROW_O.contains(&ch) {
        return MouthState::Open;
    }
    // 'i' reads closest to the e shape
    if ROW_I.contains(&ch) || ROW_E.contains(&ch) {
        return MouthState::E;
    }
    if ROW_U.contains(&ch) {
        return MouthState::U;
    }

    MouthState::Half
}

/// Strip punctuation and whitespace, then classify what remains.
pub fn analyze_text(text: &str, rate: f32) -> Vec<Phoneme> {
    let rate = if rate > 0.0 { rate } else { 1.0 };
    text.chars()
        .filter(|c| !c.is_whitespace() && !PUNCTUATION.contains(c))
        .map(|ch| Phoneme {
            ch,
            state: classify_char(ch),
            duration: CHAR_DURATION.div_f32(rate),
        })
        .collect()
}

/// Fixed representative report per mouth shape. Monotonic in overall level
/// (closed < half < open); `e` skews high-band, `u` skews low-band.
pub fn mouth_state_report(state: MouthState) -> AudioVolumeData {
    match state {
        MouthState::Closed => AudioVolumeData::new(0.0, 0.0, 0.0),
        MouthState::Half => AudioVolumeData::new(0.3, 0.15, 0.15),
        MouthState::Open => AudioVolumeData::new(0.6, 0.3, 0.3),
        MouthState::E => AudioVolumeData::new(0.5, 0.1, 0.4),
        MouthState::U => AudioVolumeData::new(0.5, 0.4, 0.1),
    }
}

/// Audio-free lip-sync animator driving the report bus from text.
pub struct TextBasedLipsync {
    bus: ReportBus,
}

impl TextBasedLipsync {
    pub fn new(bus: ReportBus) -> Self {
        Self { bus }
    }

    /// Play the synthetic report sequence for `text`, blocking until the
    /// sequence completes or `cancel` is raised. A final all-zero report is
    /// emitted on every exit path.
    pub fn animate(&self, text: &str, rate: f32, cancel: &AtomicBool) {
        let phonemes = analyze_text(text, rate);
        log::info!("Text lipsync: {} phonemes at rate {}", phonemes.len(), rate);

        for phoneme in &phonemes {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            self.bus.push(mouth_state_report(phoneme.state));
            std::thread::sleep(phoneme.duration);
        }

        self.bus.push(AudioVolumeData::SILENCE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_vowel_rows() {
        assert_eq!(classify_char('あ'), MouthState::Open);
        assert_eq!(classify_char('こ'), MouthState::Open);
        assert_eq!(classify_char('い'), MouthState::E);
        assert_eq!(classify_char('え'), MouthState::E);
        assert_eq!(classify_char('う'), MouthState::U);
        assert_eq!(classify_char('フ'), MouthState::U);
        assert_eq!(classify_char('っ'), MouthState::Closed);
        assert_eq!(classify_char('ン'), MouthState::Half);
        // Unclassified characters default to half
        assert_eq!(classify_char('x'), MouthState::Half);
        assert_eq!(classify_char('漢'), MouthState::Half);
    }

    #[test]
    fn test_analyze_strips_punctuation_and_whitespace() {
        let phonemes = analyze_text("こん にちは。！？…、", 1.0);
        let chars: String = phonemes.iter().map(|p| p.ch).collect();
        assert_eq!(chars, "こんにちは");
    }

    #[test]
    fn test_konnichiwa_durations_sum() {
        let phonemes = analyze_text("こんにちは", 1.0);
        assert_eq!(phonemes.len(), 5);

        let total: Duration = phonemes.iter().map(|p| p.duration).sum();
        assert_eq!(total, Duration::from_millis(750));

        let states: Vec<MouthState> = phonemes.iter().map(|p| p.state).collect();
        assert_eq!(
            states,
            vec![
                MouthState::Open, // こ
                MouthState::Half, // ん
                MouthState::E,    // に
                MouthState::E,    // ち
                MouthState::Open, // は
            ]
        );
    }

    #[test]
    fn test_rate_divides_duration() {
        let phonemes = analyze_text("あ", 2.0);
        assert_eq!(phonemes[0].duration, Duration::from_millis(75));

        // A non-positive rate falls back to 1.0 rather than hanging
        let phonemes = analyze_text("あ", 0.0);
        assert_eq!(phonemes[0].duration, Duration::from_millis(150));
    }

    #[test]
    fn test_report_table_is_monotonic() {
        let closed = mouth_state_report(MouthState::Closed);
        let half = mouth_state_report(MouthState::Half);
        let open = mouth_state_report(MouthState::Open);
        assert!(closed.rms < half.rms && half.rms < open.rms);

        let e = mouth_state_report(MouthState::E);
        let u = mouth_state_report(MouthState::U);
        assert!(e.high > e.low, "e skews high-band");
        assert!(u.low > u.high, "u skews low-band");
    }

    #[test]
    fn test_cancel_forces_final_zero_report() {
        let bus = ReportBus::new(64);
        let lipsync = TextBasedLipsync::new(bus.clone_ref());
        let cancel = AtomicBool::new(true);

        lipsync.animate("こんにちは", 1.0, &cancel);

        // Canceled before the first phoneme: only the final silence lands
        assert_eq!(bus.latest().unwrap(), AudioVolumeData::SILENCE);
    }
}
