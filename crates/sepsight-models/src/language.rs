//! Language detection for clinical notes
//!
//! [`TrigramDetector`] runs whatlang's n-gram model over the six languages
//! the notes arrive in. When whatlang is not confident, a lexicon of function
//! words and ICU vocabulary decides, and whatlang's guess stands only if the
//! lexicon cannot. Text with no letters at all is a detection failure.

use aho_corasick::{AhoCorasick, MatchKind};
use sepsight_core::{Error, LanguageTag, Result};
use std::collections::BTreeMap;
use whatlang::Lang;

/// Detects the language of a piece of text
pub trait LanguageDetector: Send + Sync {
    /// Detect the language; an error means the detector could not decide
    fn detect(&self, text: &str) -> Result<LanguageTag>;

    /// Detector name for logs
    fn name(&self) -> &str;
}

const SPANISH: &[&str] = &[
    "el", "la", "los", "las", "de", "del", "que", "y", "en", "un", "una", "con", "por", "para",
    "se", "es", "está", "están", "sin", "pero", "más", "muy", "no", "le", "lo", "al", "su", "sus",
    "hay", "ha", "han", "como", "cuando", "desde", "hasta", "sobre", "también", "tras", "durante",
    "paciente", "estable", "dolor", "fiebre", "ingreso", "ingresa", "presenta", "tratamiento",
    "diagnóstico", "insuficiencia", "respiratoria", "hipotensión", "antibiótico", "antibióticos",
    "días", "horas", "años", "mujer", "varón", "hombre", "refiere", "niega", "sangre",
    "hemocultivos", "neumonía", "evolución", "exploración", "consciente", "orientado",
    "orientada", "presión", "arterial", "frecuencia", "cardíaca", "cardiaca", "buen", "estado",
    "general", "origen", "urinario", "urinaria", "secundario", "secundaria", "séptico", "séptica",
    "lactato", "noradrenalina", "intubado", "intubada", "sedoanalgesia", "diuresis",
    "conservada", "conservado", "foco", "afebril", "hipotenso", "hipotensa", "taquicardia",
    "creatinina", "plaquetas", "leucocitosis", "empeoramiento", "vasoactivas", "precisa",
    "mantiene", "ingresado", "ingresada",
];

const ENGLISH: &[&str] = &[
    "the", "and", "of", "to", "in", "is", "was", "with", "for", "no", "not", "on", "at", "by",
    "this", "that", "he", "she", "his", "her", "has", "have", "had", "were", "are", "be", "been",
    "after", "without", "patient", "stable", "pain", "fever", "admitted", "history", "treatment",
    "blood", "pressure", "heart", "rate", "denies", "reports", "presents", "shows", "days",
    "hours", "years", "male", "female", "old", "respiratory", "failure", "culture", "cultures",
    "pneumonia", "antibiotics", "good", "general", "condition",
];

const PORTUGUESE: &[&str] = &[
    "o", "os", "as", "do", "da", "dos", "das", "de", "que", "e", "em", "um", "uma", "com", "não",
    "por", "para", "se", "está", "sem", "mas", "muito", "também", "quando", "ele", "ela", "foi",
    "são", "após", "paciente", "estável", "dor", "febre", "internado", "internação",
    "tratamento", "sangue", "pressão", "dias", "horas", "anos", "apresenta", "nega",
];

const FRENCH: &[&str] = &[
    "le", "la", "les", "de", "des", "du", "et", "en", "un", "une", "avec", "pour", "sans", "est",
    "sont", "il", "elle", "mais", "très", "aussi", "dans", "sur", "pas", "ne", "qui", "au",
    "aux", "après", "patient", "patiente", "stable", "douleur", "fièvre", "hospitalisé",
    "traitement", "sang", "pression", "jours", "heures", "ans", "présente",
];

const ITALIAN: &[&str] = &[
    "il", "lo", "la", "gli", "le", "di", "del", "della", "che", "e", "in", "un", "una", "con",
    "per", "senza", "è", "sono", "ma", "molto", "anche", "nel", "nella", "non", "dopo",
    "paziente", "stabile", "dolore", "febbre", "ricoverato", "ricoverata", "trattamento",
    "sangue", "pressione", "giorni", "ore", "anni", "presenta",
];

const GERMAN: &[&str] = &[
    "der", "die", "das", "und", "ist", "mit", "von", "zu", "den", "dem", "ein", "eine", "nicht",
    "für", "bei", "aber", "sehr", "auch", "nach", "ohne", "im", "auf", "patient", "patientin",
    "stabil", "schmerzen", "fieber", "aufgenommen", "behandlung", "blut", "druck", "tage",
    "stunden", "jahre",
];

/// Detector scoring languages by lexicon hits
pub struct LexiconDetector {
    name: String,
    matcher: AhoCorasick,
    /// Languages credited by each matcher pattern
    pattern_langs: Vec<Vec<&'static str>>,
}

impl LexiconDetector {
    /// Detector over Spanish, English, Portuguese, French, Italian and German
    pub fn new() -> Result<Self> {
        Self::with_lexicons(&[
            ("es", SPANISH),
            ("en", ENGLISH),
            ("pt", PORTUGUESE),
            ("fr", FRENCH),
            ("it", ITALIAN),
            ("de", GERMAN),
        ])
    }

    /// Detector over caller-supplied lexicons; words are matched lowercase
    pub fn with_lexicons(lexicons: &[(&'static str, &[&str])]) -> Result<Self> {
        let mut vocabulary: BTreeMap<String, Vec<&'static str>> = BTreeMap::new();
        for (lang, words) in lexicons {
            for word in *words {
                let langs = vocabulary.entry(word.to_lowercase()).or_default();
                if !langs.contains(lang) {
                    langs.push(*lang);
                }
            }
        }

        let (patterns, pattern_langs): (Vec<String>, Vec<Vec<&'static str>>) =
            vocabulary.into_iter().unzip();

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .map_err(|e| Error::internal(format!("Failed to build language lexicon matcher: {e}")))?;

        Ok(Self {
            name: "lexicon".to_string(),
            matcher,
            pattern_langs,
        })
    }

    /// Whole-word hit counts per language
    pub fn scores(&self, text: &str) -> BTreeMap<&'static str, usize> {
        let lowered = text.to_lowercase();
        let mut scores = BTreeMap::new();

        for m in self.matcher.find_iter(&lowered) {
            let before = lowered[..m.start()].chars().next_back();
            let after = lowered[m.end()..].chars().next();
            if before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric) {
                continue;
            }
            for lang in &self.pattern_langs[m.pattern().as_usize()] {
                *scores.entry(*lang).or_insert(0) += 1;
            }
        }

        scores
    }
}

impl LanguageDetector for LexiconDetector {
    fn detect(&self, text: &str) -> Result<LanguageTag> {
        let scores = self.scores(text);

        let mut ranked: Vec<(&str, usize)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        match ranked.as_slice() {
            [] => Err(Error::detection("no recognizable words")),
            [(lang, _)] => Ok(LanguageTag::new(*lang)),
            [(first, top), (second, runner_up), ..] => {
                if top == runner_up {
                    Err(Error::detection(format!(
                        "ambiguous between '{first}' and '{second}' ({top} hits each)"
                    )))
                } else {
                    Ok(LanguageTag::new(*first))
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Languages whatlang may answer with, and their tags
const TRIGRAM_LANGS: [(Lang, &str); 6] = [
    (Lang::Spa, "es"),
    (Lang::Eng, "en"),
    (Lang::Por, "pt"),
    (Lang::Fra, "fr"),
    (Lang::Ita, "it"),
    (Lang::Deu, "de"),
];

/// An n-gram model's answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guess {
    pub lang: &'static str,
    pub reliable: bool,
}

/// Pick a language from the n-gram guess and the lexicon vote
///
/// A reliable guess wins outright. Otherwise a clear lexicon winner wins,
/// then an unreliable guess. With neither, the lexicon's error stands.
pub fn arbitrate(guess: Option<Guess>, lexicon: Result<LanguageTag>) -> Result<LanguageTag> {
    match (guess, lexicon) {
        (Some(guess), _) if guess.reliable => Ok(LanguageTag::new(guess.lang)),
        (_, Ok(tag)) => Ok(tag),
        (Some(guess), Err(_)) => Ok(LanguageTag::new(guess.lang)),
        (None, Err(e)) => Err(e),
    }
}

/// whatlang n-gram detector with a lexicon tie-breaker
pub struct TrigramDetector {
    detector: whatlang::Detector,
    lexicon: LexiconDetector,
}

impl TrigramDetector {
    pub fn new() -> Result<Self> {
        let allowlist = TRIGRAM_LANGS.iter().map(|(lang, _)| *lang).collect();
        Ok(Self {
            detector: whatlang::Detector::with_allowlist(allowlist),
            lexicon: LexiconDetector::new()?,
        })
    }

    /// whatlang's answer, if the text has anything to go on
    pub fn guess(&self, text: &str) -> Option<Guess> {
        let info = self.detector.detect(text)?;
        let lang = TRIGRAM_LANGS
            .iter()
            .find(|(lang, _)| *lang == info.lang())
            .map(|(_, tag)| *tag)?;
        Some(Guess {
            lang,
            reliable: info.is_reliable(),
        })
    }
}

impl LanguageDetector for TrigramDetector {
    fn detect(&self, text: &str) -> Result<LanguageTag> {
        let guess = self.guess(text);
        if let Some(guess) = guess.filter(|g| g.reliable) {
            return Ok(LanguageTag::new(guess.lang));
        }
        arbitrate(guess, self.lexicon.detect(text))
    }

    fn name(&self) -> &str {
        "whatlang"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigram() -> TrigramDetector {
        TrigramDetector::new().unwrap()
    }

    #[test]
    fn test_spanish_icu_notes() {
        let detector = trigram();
        for note in [
            "Sepsis de origen urinario",
            "Shock séptico secundario a peritonitis. Lactato 4.5. Noradrenalina a 0.3 mcg/kg/min.",
            "Paciente intubado, sedoanalgesia, diuresis conservada",
            "Mujer de 72 años ingresada por neumonía. Precisa drogas vasoactivas, afebril.",
        ] {
            let tag = detector.detect(note).unwrap();
            assert!(tag.is_spanish(), "{note:?} detected as {}", tag.as_str());
        }
    }

    #[test]
    fn test_trigram_english_note() {
        let tag = trigram()
            .detect("Septic shock secondary to a urinary source. Started on norepinephrine overnight.")
            .unwrap();
        assert_eq!(tag.as_str(), "en");
    }

    #[test]
    fn test_trigram_no_letters_is_failure() {
        let result = trigram().detect("12345 ### 98.6");
        assert!(matches!(result, Err(Error::Detection(_))));
    }

    #[test]
    fn test_reliable_guess_wins() {
        let guess = Guess { lang: "en", reliable: true };
        let tag = arbitrate(Some(guess), Ok(LanguageTag::new("es"))).unwrap();
        assert_eq!(tag.as_str(), "en");
    }

    #[test]
    fn test_lexicon_breaks_unreliable_guess() {
        let guess = Guess { lang: "pt", reliable: false };
        let tag = arbitrate(Some(guess), Ok(LanguageTag::new("es"))).unwrap();
        assert_eq!(tag.as_str(), "es");

        // Lexicon tie: the unreliable guess still beats giving up
        let tag = arbitrate(Some(guess), Err(Error::detection("ambiguous"))).unwrap();
        assert_eq!(tag.as_str(), "pt");
    }

    #[test]
    fn test_nothing_to_go_on() {
        let result = arbitrate(None, Err(Error::detection("no recognizable words")));
        assert!(matches!(result, Err(Error::Detection(_))));
        assert_eq!(arbitrate(None, Ok(LanguageTag::new("fr"))).unwrap().as_str(), "fr");
    }

    #[test]
    fn test_lexicon_clinical_vocabulary() {
        let detector = detector();
        assert_eq!(detector.detect("Sepsis de origen urinario").unwrap().as_str(), "es");
        assert_eq!(
            detector.detect("Paciente intubado, sedoanalgesia, diuresis conservada").unwrap().as_str(),
            "es"
        );
    }

    fn detector() -> LexiconDetector {
        LexiconDetector::new().unwrap()
    }

    #[test]
    fn test_short_spanish_note() {
        let tag = detector().detect("paciente estable").unwrap();
        assert_eq!(tag.as_str(), "es");
    }

    #[test]
    fn test_spanish_note_with_accents() {
        let tag = detector()
            .detect("Varón de 67 años que ingresa por neumonía con hipotensión. Niega dolor torácico.")
            .unwrap();
        assert!(tag.is_spanish());
    }

    #[test]
    fn test_uppercase_spanish() {
        let tag = detector().detect("PACIENTE CON FIEBRE Y DOLOR").unwrap();
        assert_eq!(tag.as_str(), "es");
    }

    #[test]
    fn test_english_note() {
        let tag = detector()
            .detect("The patient was admitted with fever and denies chest pain.")
            .unwrap();
        assert_eq!(tag.as_str(), "en");
    }

    #[test]
    fn test_portuguese_note() {
        let tag = detector()
            .detect("Paciente estável, sem febre, apresenta dor há dois dias.")
            .unwrap();
        assert_eq!(tag.as_str(), "pt");
    }

    #[test]
    fn test_no_words_is_failure() {
        let result = detector().detect("12345 ### 98.6");
        assert!(matches!(result, Err(Error::Detection(_))));
    }

    #[test]
    fn test_tie_is_failure() {
        // "stable" is both English and French
        let result = detector().detect("stable");
        assert!(matches!(result, Err(Error::Detection(_))));
    }

    #[test]
    fn test_whole_words_only() {
        // "el" inside "hello" and "de" inside "denied" must not count
        let scores = detector().scores("hello");
        assert!(scores.is_empty());
        let scores = detector().scores("model");
        assert!(scores.get("es").is_none());
    }

    #[test]
    fn test_custom_lexicons() {
        let detector = LexiconDetector::with_lexicons(&[("xx", &["foo"]), ("yy", &["bar"])]).unwrap();
        assert_eq!(detector.detect("foo foo bar").unwrap().as_str(), "xx");
    }
}
