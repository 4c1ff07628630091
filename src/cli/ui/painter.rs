use owo_colors::{OwoColorize, Style};

/// How a fragment of terminal text should stand out.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Tone {
    Heading,
    Good,
    Bad,
    Muted,
    Strong,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Heading => Style::new().bold().cyan(),
            Self::Good => Style::new().bold().green(),
            Self::Bad => Style::new().bold().red(),
            Self::Muted => Style::new().dimmed(),
            Self::Strong => Style::new().bold(),
        }
    }
}

/// Applies colour to terminal text, or passes it through when output is piped.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn paint(&self, tone: Tone, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.use_colour {
            text.style(tone.style()).to_string()
        } else {
            text.to_string()
        }
    }

    pub(crate) fn heading(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Heading, text)
    }

    pub(crate) fn muted(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Muted, text)
    }

    pub(crate) fn strong(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Strong, text)
    }

    /// Green for `true`, red for `false`.
    pub(crate) fn verdict(&self, ok: bool, text: impl AsRef<str>) -> String {
        self.paint(if ok { Tone::Good } else { Tone::Bad }, text)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::heading(Tone::Heading)]
    #[case::good(Tone::Good)]
    #[case::bad(Tone::Bad)]
    #[case::muted(Tone::Muted)]
    #[case::strong(Tone::Strong)]
    fn piped_output_is_left_plain(#[case] tone: Tone) {
        assert_eq!("e5:f6:78:80:07:00", Painter::new(false).paint(tone, "e5:f6:78:80:07:00"));
    }

    #[rstest]
    #[case::heading(Tone::Heading)]
    #[case::good(Tone::Good)]
    #[case::bad(Tone::Bad)]
    #[case::muted(Tone::Muted)]
    #[case::strong(Tone::Strong)]
    fn terminal_output_is_styled(#[case] tone: Tone) {
        let styled = Painter::new(true).paint(tone, "ok");
        assert_ne!("ok", styled);
        assert!(styled.contains("ok"));
    }
}
