//! Majority-relative language classification
//!
//! Each detected text casts a weighted ballot; the final language set is
//! every language whose ballot reaches half the maximum observed. The
//! relative threshold lets multilingual instances keep several tags while
//! single stray detections are filtered out.

use std::collections::HashMap;

use whatlang::Lang;

/// Ballot accumulator for one instance. Transient: built during
/// evaluation, consumed by [`LanguageVoter::tally`].
#[derive(Debug, Default)]
pub struct LanguageVoter {
    ballots: HashMap<String, u32>,
}

impl LanguageVoter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the ballot from the instance's own texts: description
    /// carries weight 3, otherwise the display name carries weight 1.
    pub fn seed(&mut self, description: Option<&str>, name: Option<&str>) {
        if let Some(text) = description.filter(|t| !t.trim().is_empty()) {
            self.cast_weighted(text, 3);
        } else if let Some(text) = name.filter(|t| !t.trim().is_empty()) {
            self.cast_weighted(text, 1);
        }
    }

    /// Casts one ballot for the language detected in a sampled post.
    pub fn cast(&mut self, text: &str) {
        self.cast_weighted(text, 1);
    }

    fn cast_weighted(&mut self, text: &str, weight: u32) {
        if let Some(info) = whatlang::detect(text) {
            *self
                .ballots
                .entry(iso_code(info.lang()).to_string())
                .or_insert(0) += weight;
        }
    }

    /// Every language whose ballot reaches half the maximum, sorted for
    /// deterministic output. Falls back to `default_langs` when nothing
    /// was detected at all.
    pub fn tally(self, default_langs: &[String]) -> Vec<String> {
        let Some(max) = self.ballots.values().copied().max() else {
            return default_langs.to_vec();
        };

        let mut langs: Vec<String> = self
            .ballots
            .into_iter()
            .filter(|(_, weight)| weight * 2 >= max)
            .map(|(lang, _)| lang)
            .collect();
        langs.sort();
        langs
    }
}

/// ISO 639-1 code where one exists; whatlang's 639-3 code otherwise.
fn iso_code(lang: Lang) -> &'static str {
    match lang {
        Lang::Jpn => "ja",
        Lang::Eng => "en",
        Lang::Deu => "de",
        Lang::Fra => "fr",
        Lang::Cmn => "zh",
        Lang::Kor => "ko",
        Lang::Rus => "ru",
        Lang::Tha => "th",
        Lang::Spa => "es",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Tur => "tr",
        Lang::Ara => "ar",
        Lang::Ukr => "uk",
        Lang::Vie => "vi",
        Lang::Ind => "id",
        Lang::Fin => "fi",
        Lang::Swe => "sv",
        Lang::Ces => "cs",
        Lang::Hun => "hu",
        Lang::Ell => "el",
        Lang::Heb => "he",
        Lang::Dan => "da",
        other => other.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JA_TEXT: &str = "今日はとても良い天気ですね。散歩に行って、新しい喫茶店でコーヒーを飲みました。";
    const EN_TEXT: &str =
        "The weather has been wonderful today, so we went for a long walk through the park \
         and stopped for coffee at the new place around the corner.";

    fn defaults() -> Vec<String> {
        vec!["ja".to_string(), "en".to_string()]
    }

    #[test]
    fn description_outvotes_a_single_stray_post() {
        let mut voter = LanguageVoter::new();
        voter.seed(Some(EN_TEXT), None);
        voter.cast(JA_TEXT);

        // en has 3 ballots; ja's single ballot is below half of the maximum
        assert_eq!(voter.tally(&defaults()), vec!["en"]);
    }

    #[test]
    fn balanced_languages_both_survive_the_threshold() {
        let mut voter = LanguageVoter::new();
        voter.cast(EN_TEXT);
        voter.cast(EN_TEXT);
        voter.cast(JA_TEXT);
        voter.cast(JA_TEXT);

        assert_eq!(voter.tally(&defaults()), vec!["en", "ja"]);
    }

    #[test]
    fn display_name_seeds_with_weight_one_when_description_missing() {
        let mut voter = LanguageVoter::new();
        voter.seed(None, Some(JA_TEXT));
        voter.cast(EN_TEXT);

        // one ballot each: both reach half of the maximum
        assert_eq!(voter.tally(&defaults()), vec!["en", "ja"]);
    }

    #[test]
    fn no_detection_falls_back_to_the_default_set() {
        let voter = LanguageVoter::new();
        assert_eq!(voter.tally(&defaults()), defaults());
    }

    #[test]
    fn blank_texts_never_cast_ballots() {
        let mut voter = LanguageVoter::new();
        voter.seed(Some("   "), Some(""));

        assert_eq!(voter.tally(&defaults()), defaults());
    }
}
