//! Base themes a theme can inherit rules from

use serde::{Deserialize, Serialize};

use super::{Color, FontStyle, ThemeRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseTheme {
    #[serde(rename = "vs")]
    Vs,
    #[serde(rename = "vs-dark")]
    VsDark,
    #[serde(rename = "hc-black")]
    HcBlack,
    #[serde(rename = "hc-light")]
    HcLight,
}

/// (token, foreground, background, font style)
type BaseRule = (&'static str, Option<&'static str>, Option<&'static str>, Option<&'static str>);

const VS: &[BaseRule] = &[
    ("", Some("000000"), Some("fffffe"), None),
    ("invalid", Some("cd3131"), None, None),
    ("emphasis", None, None, Some("italic")),
    ("strong", None, None, Some("bold")),
    ("variable", Some("001188"), None, None),
    ("variable.predefined", Some("4864AA"), None, None),
    ("constant", Some("dd0000"), None, None),
    ("comment", Some("008000"), None, None),
    ("number", Some("098658"), None, None),
    ("number.hex", Some("3030c0"), None, None),
    ("regexp", Some("800000"), None, None),
    ("annotation", Some("808080"), None, None),
    ("type", Some("008080"), None, None),
    ("delimiter", Some("000000"), None, None),
    ("tag", Some("800000"), None, None),
    ("metatag", Some("e00000"), None, None),
    ("key", Some("863B00"), None, None),
    ("string", Some("A31515"), None, None),
    ("keyword", Some("0000FF"), None, None),
    ("operator", Some("000000"), None, None),
];

const VS_DARK: &[BaseRule] = &[
    ("", Some("D4D4D4"), Some("1E1E1E"), None),
    ("invalid", Some("f44747"), None, None),
    ("emphasis", None, None, Some("italic")),
    ("strong", None, None, Some("bold")),
    ("variable", Some("74B0DF"), None, None),
    ("variable.predefined", Some("4864AA"), None, None),
    ("variable.parameter", Some("9CDCFE"), None, None),
    ("constant", Some("569CD6"), None, None),
    ("comment", Some("608B4E"), None, None),
    ("number", Some("B5CEA8"), None, None),
    ("number.hex", Some("5BB498"), None, None),
    ("regexp", Some("B46695"), None, None),
    ("annotation", Some("cc6666"), None, None),
    ("type", Some("3DC9B0"), None, None),
    ("delimiter", Some("DCDCDC"), None, None),
    ("tag", Some("569CD6"), None, None),
    ("metatag", Some("DD6A6F"), None, None),
    ("key", Some("9CDCFE"), None, None),
    ("string", Some("CE9178"), None, None),
    ("keyword", Some("569CD6"), None, None),
    ("operator", Some("D4D4D4"), None, None),
];

const HC_BLACK: &[BaseRule] = &[
    ("", Some("FFFFFF"), Some("000000"), None),
    ("invalid", Some("f44747"), None, None),
    ("emphasis", None, None, Some("italic")),
    ("strong", None, None, Some("bold")),
    ("variable", Some("1AEBFF"), None, None),
    ("constant", Some("569CD6"), None, None),
    ("comment", Some("608B4E"), None, None),
    ("number", Some("FFFFFF"), None, None),
    ("regexp", Some("C0C0C0"), None, None),
    ("type", Some("3DC9B0"), None, None),
    ("delimiter", Some("FFFF00"), None, None),
    ("tag", Some("569CD6"), None, None),
    ("key", Some("9CDCFE"), None, None),
    ("string", Some("CE9178"), None, None),
    ("keyword", Some("569CD6"), None, None),
    ("operator", Some("D4D4D4"), None, None),
];

const HC_LIGHT: &[BaseRule] = &[
    ("", Some("292929"), Some("FFFFFF"), None),
    ("invalid", Some("B5200D"), None, None),
    ("emphasis", None, None, Some("italic")),
    ("strong", None, None, Some("bold")),
    ("variable", Some("264F70"), None, None),
    ("constant", Some("7F0000"), None, None),
    ("comment", Some("515151"), None, None),
    ("number", Some("096D48"), None, None),
    ("regexp", Some("811F3F"), None, None),
    ("type", Some("0F4A85"), None, None),
    ("delimiter", Some("292929"), None, None),
    ("tag", Some("0F4A85"), None, None),
    ("key", Some("0F4A85"), None, None),
    ("string", Some("0F4A85"), None, None),
    ("keyword", Some("0F4A85"), None, None),
    ("operator", Some("292929"), None, None),
];

impl BaseTheme {
    pub fn id(self) -> &'static str {
        match self {
            BaseTheme::Vs => "vs",
            BaseTheme::VsDark => "vs-dark",
            BaseTheme::HcBlack => "hc-black",
            BaseTheme::HcLight => "hc-light",
        }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, BaseTheme::VsDark | BaseTheme::HcBlack)
    }

    /// Token rules inherited by themes with `inherit: true`
    pub fn rules(self) -> Vec<ThemeRule> {
        let table = match self {
            BaseTheme::Vs => VS,
            BaseTheme::VsDark => VS_DARK,
            BaseTheme::HcBlack => HC_BLACK,
            BaseTheme::HcLight => HC_LIGHT,
        };
        table
            .iter()
            .map(|&(token, fg, bg, style)| ThemeRule {
                scope: token.to_string(),
                foreground: fg.and_then(|c| Color::from_hex(c).ok()),
                background: bg.and_then(|c| Color::from_hex(c).ok()),
                font_style: style.map(FontStyle::parse),
            })
            .collect()
    }
}
