/// Try to get a keyword from a string, ignoring string casing.
pub fn keyword_from_str(s: &str) -> Option<Keyword> {
    let s = unicase::Ascii::new(s);
    let idx = match KEYWORD_STRINGS.binary_search(&s) {
        Ok(idx) => idx,
        Err(_) => return None,
    };
    Some(ALL_KEYWORDS[idx])
}

/// Generate an enum of keywords.
///
/// Keywords must be listed in sorted order for the binary search in
/// `keyword_from_str`.
macro_rules! define_keywords {
    ($($ident:ident),*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(non_camel_case_types)]
        pub enum Keyword {
            $($ident),*
        }

        pub const ALL_KEYWORDS: &'static [Keyword] = &[
            $(Keyword::$ident),*
        ];

        pub const KEYWORD_STRINGS: &'static [unicase::Ascii<&'static str>] = &[
            $(unicase::Ascii::new(stringify!($ident)),)*
        ];
    };
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        // Keywords and strings are generated in the same order.
        let idx = ALL_KEYWORDS
            .iter()
            .position(|k| k == self)
            .unwrap_or_default();
        KEYWORD_STRINGS[idx].into_inner()
    }

    /// Keywords that name a built-in function and are parsed as a function
    /// call when followed by an opening paren.
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            Keyword::ABS
                | Keyword::AVG
                | Keyword::CONCAT
                | Keyword::COUNT
                | Keyword::LENGTH
                | Keyword::LOCATE
                | Keyword::LOWER
                | Keyword::MAX
                | Keyword::MIN
                | Keyword::MOD
                | Keyword::SIZE
                | Keyword::SQRT
                | Keyword::SUBSTRING
                | Keyword::SUM
                | Keyword::UPPER
        )
    }
}

#[rustfmt::skip]
define_keywords!(
    ABS,
    ALL,
    AND,
    ANY,
    AS,
    ASC,
    AVG,
    BETWEEN,
    BOTH,
    BY,
    CONCAT,
    COUNT,
    CURRENT_DATE,
    CURRENT_TIME,
    CURRENT_TIMESTAMP,
    DELETE,
    DESC,
    DISTINCT,
    EMPTY,
    ESCAPE,
    EXISTS,
    FALSE,
    FETCH,
    FROM,
    GROUP,
    HAVING,
    IN,
    INNER,
    IS,
    JOIN,
    LEADING,
    LEFT,
    LENGTH,
    LIKE,
    LIMIT,
    LOCATE,
    LOWER,
    MAX,
    MEMBER,
    MIN,
    MOD,
    NEW,
    NOT,
    NULL,
    OBJECT,
    OF,
    OFFSET,
    OR,
    ORDER,
    OUTER,
    SELECT,
    SET,
    SIZE,
    SOME,
    SQRT,
    SUBSTRING,
    SUM,
    TRAILING,
    TRIM,
    TRUE,
    UPDATE,
    UPPER,
    WHERE
);
