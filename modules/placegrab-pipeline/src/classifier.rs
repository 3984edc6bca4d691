const PLACE_NOUNS: &[&str] = &["공간", "곳", "장소", "작업실", "매장", "스토어", "전시"];
const INFO_MARKERS: &[&str] = &["📍", "주소", "위치", "🗓️", "기간", "일시", "운영", "지도", "근처"];
const ACTION_VERBS: &[&str] = &["추천", "공유", "저장", "가보세", "방문", "데이트", "소개"];

/// Keyword hit counts for one caption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentScores {
    pub place: usize,
    pub info: usize,
    pub action: usize,
}

/// Minimum hits per signal for a caption to count as a place post.
/// Any one satisfied signal is enough; a zero threshold disables that signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentPolicy {
    pub min_place: usize,
    pub min_info: usize,
    pub min_action: usize,
}

impl Default for IntentPolicy {
    fn default() -> Self {
        Self {
            min_place: 1,
            min_info: 1,
            min_action: 1,
        }
    }
}

impl IntentPolicy {
    pub fn accepts(&self, scores: &IntentScores) -> bool {
        let met = |min: usize, hits: usize| min > 0 && hits >= min;
        met(self.min_place, scores.place)
            || met(self.min_info, scores.info)
            || met(self.min_action, scores.action)
    }
}

pub fn score(caption: &str) -> IntentScores {
    let hits = |words: &[&str]| words.iter().filter(|w| caption.contains(*w)).count();
    IntentScores {
        place: hits(PLACE_NOUNS),
        info: hits(INFO_MARKERS),
        action: hits(ACTION_VERBS),
    }
}

pub fn is_place_post(caption: &str, policy: &IntentPolicy) -> bool {
    policy.accepts(&score(caption))
}
