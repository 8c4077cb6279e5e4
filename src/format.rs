use std::fmt;

/// Boot image container dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Plain Android boot image with a Samsung SEAndroid trailer.
    Android,
    /// Android boot image with a Bump trailer.
    Bump,
    /// Android boot image scrambled by the Loki patcher. Read-only.
    Loki,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Android => "android",
            Format::Bump => "bump",
            Format::Loki => "loki",
        }
    }

    pub fn from_name(name: &str) -> Option<Format> {
        match name {
            "android" => Some(Format::Android),
            "bump" => Some(Format::Bump),
            "loki" => Some(Format::Loki),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trip() {
        for format in [Format::Android, Format::Bump, Format::Loki] {
            assert_eq!(Format::from_name(format.name()), Some(format));
        }
        assert_eq!(Format::from_name("mtk"), None);
    }
}
