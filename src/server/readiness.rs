//! Readiness detection from backend log output.
//!
//! The backend prints one of a few fixed phrases once it is about to accept
//! connections. Matching free text is fragile (any change in the backend's
//! log wording breaks it), so a match only moves the supervisor on to HTTP
//! probing; the probe is what confirms readiness.

/// Latching matcher over a fixed marker set.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    markers: Vec<String>,
    matched: Option<String>,
}

impl ReadinessDetector {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
            matched: None,
        }
    }

    /// Returns the first marker contained in `line`.
    pub fn find_marker(&self, line: &str) -> Option<&str> {
        self.markers
            .iter()
            .find(|m| line.contains(m.as_str()))
            .map(String::as_str)
    }

    /// Feeds one line of output.
    ///
    /// Returns `true` only for the line that first matched; once ready the
    /// detector stays ready whatever follows.
    pub fn observe(&mut self, line: &str) -> bool {
        if self.matched.is_some() {
            return false;
        }

        match self.find_marker(line).map(str::to_string) {
            Some(marker) => {
                tracing::debug!(%marker, "Readiness marker observed");
                self.matched = Some(marker);
                true
            }
            None => false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.matched.is_some()
    }

    /// Marker that made the detector ready.
    pub fn matched_marker(&self) -> Option<&str> {
        self.matched.as_deref()
    }

    /// Forgets a previous match, for a new start-up attempt.
    pub fn reset(&mut self) {
        self.matched = None;
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}
