use std::fmt::Display;

/// The branches a poller evaluates when it is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Clears when disabled, fetches once when pinned and polls otherwise.
    Conditional,
    /// Always enabled, fetches once when pinned and polls otherwise.
    Pinnable,
    /// Always polls live data.
    Continuous,
}

impl PollMode {
    pub fn honours_enabled(&self) -> bool {
        matches!(self, PollMode::Conditional)
    }

    pub fn honours_pinned(&self) -> bool {
        !matches!(self, PollMode::Continuous)
    }
}

impl Display for PollMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollMode::Conditional => write!(f, "conditional"),
            PollMode::Pinnable => write!(f, "pinnable"),
            PollMode::Continuous => write!(f, "continuous"),
        }
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u64(DurationMillisecondVisitor)
    }

    struct DurationMillisecondVisitor;
    impl<'de> serde::de::Visitor<'de> for DurationMillisecondVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a millisecond duration")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_millis(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u64::try_from(value)
                .map(Duration::from_millis)
                .map_err(|_| E::custom("a millisecond duration cannot be negative"))
        }
    }
}
