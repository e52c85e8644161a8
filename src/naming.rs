use std::fmt;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Mate, SampleId};

static OLC_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+-SEQ-[0-9]+$").expect("static OLC id pattern"));

pub trait NamingConvention: Send + Sync {
    fn name(&self) -> &'static str;

    fn candidate<'a>(&self, file_name: &'a str) -> Option<&'a str>;

    fn is_valid(&self, token: &str) -> bool;

    fn forward_marker(&self) -> &str {
        "_R1"
    }

    fn reverse_marker(&self) -> &str {
        "_R2"
    }

    fn index_marker(&self) -> &str {
        "_S"
    }

    fn validate(&self, file_name: &str) -> Result<SampleId, String> {
        let token = self.candidate(file_name).unwrap_or(file_name);
        if !self.is_valid(token) {
            return Err(token.to_string());
        }
        token.parse::<SampleId>().map_err(|_| token.to_string())
    }

    fn mate(&self, file_name: &str) -> Option<Mate> {
        let rest = self
            .candidate(file_name)
            .map(|token| &file_name[token.len()..])
            .unwrap_or(file_name);
        if rest.contains(self.forward_marker()) {
            Some(Mate::Forward)
        } else if rest.contains(self.reverse_marker()) {
            Some(Mate::Reverse)
        } else {
            None
        }
    }

    fn with_index_token(&self, file_name: &str, token: &str) -> Option<String> {
        let offset = self.candidate(file_name).map(str::len).unwrap_or(0);
        let position = file_name[offset..].find(self.index_marker())? + offset;
        let mut renamed = String::with_capacity(file_name.len() + token.len());
        renamed.push_str(&file_name[..position]);
        renamed.push_str(token);
        renamed.push_str(&file_name[position..]);
        Some(renamed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OlcConvention;

impl OlcConvention {
    pub const ID_WIDTH: usize = 13;
}

impl NamingConvention for OlcConvention {
    fn name(&self) -> &'static str {
        "olc"
    }

    fn candidate<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let end = file_name
            .char_indices()
            .nth(Self::ID_WIDTH)
            .map(|(idx, _)| idx)
            .unwrap_or(file_name.len());
        Some(&file_name[..end])
    }

    fn is_valid(&self, token: &str) -> bool {
        OLC_ID.is_match(token)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeadingTokenConvention;

impl NamingConvention for LeadingTokenConvention {
    fn name(&self) -> &'static str {
        "leading-token"
    }

    fn candidate<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name.split('_').next()
    }

    fn is_valid(&self, token: &str) -> bool {
        !token.is_empty()
            && !token.contains('.')
            && token != self.forward_marker().trim_start_matches('_')
            && token != self.reverse_marker().trim_start_matches('_')
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NamingScheme {
    #[default]
    Olc,
    LeadingToken,
}

impl NamingScheme {
    pub fn convention(&self) -> Box<dyn NamingConvention> {
        match self {
            NamingScheme::Olc => Box::new(OlcConvention),
            NamingScheme::LeadingToken => Box::new(LeadingTokenConvention),
        }
    }
}

impl fmt::Display for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingScheme::Olc => write!(f, "olc"),
            NamingScheme::LeadingToken => write!(f, "leading-token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn olc_accepts_lab_ids() {
        let id = OlcConvention
            .validate("2017-SEQ-1113_S1_L001_R1_001.fastq.gz")
            .unwrap();
        assert_eq!(id.as_str(), "2017-SEQ-1113");
    }

    #[test]
    fn olc_rejects_other_shapes() {
        assert_eq!(
            OlcConvention.validate("9999-BAD-1_R1.fastq.gz").unwrap_err(),
            "9999-BAD-1_R1"
        );
        assert!(OlcConvention.validate("12-SEQ-1234_S1_R1.fastq.gz").is_err());
        assert!(OlcConvention.validate("x.fastq.gz").is_err());
    }

    #[test]
    fn mate_is_read_after_the_id() {
        let olc = OlcConvention;
        assert_eq!(olc.mate("2017-SEQ-1113_S1_L001_R1_001.fastq.gz"), Some(Mate::Forward));
        assert_eq!(olc.mate("2017-SEQ-1113_S1_L001_R2_001.fastq.gz"), Some(Mate::Reverse));
        assert_eq!(olc.mate("2017-SEQ-1113_S1_L001_I1_001.fastq.gz"), None);
    }

    #[test]
    fn index_token_goes_before_first_marker() {
        let renamed = OlcConvention
            .with_index_token("2017-SEQ-1113_S1_L001_R1_001.fastq.gz", "_00")
            .unwrap();
        assert_eq!(renamed, "2017-SEQ-1113_00_S1_L001_R1_001.fastq.gz");
        assert_eq!(OlcConvention.with_index_token("2017-SEQ-1113_R1.fastq.gz", "_00"), None);
    }

    #[test]
    fn leading_token_convention() {
        let convention = LeadingTokenConvention;
        let id = convention.validate("soil42_S3_L001_R2_001.fastq.gz").unwrap();
        assert_eq!(id.as_str(), "soil42");
        assert_eq!(
            convention.mate("soil42_S3_L001_R2_001.fastq.gz"),
            Some(Mate::Reverse)
        );
        assert!(convention.validate("R1.fastq.gz").is_err());
    }
}
