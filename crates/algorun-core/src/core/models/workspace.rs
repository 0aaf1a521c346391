use super::history::WorkspaceHistory;
use crate::core::index::SpectrumLabels;
use serde::Serialize;

/// One row of a workspace: a labelled vector of counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrum {
    /// Dataset-defined label of this spectrum, independent of its position.
    pub number: u64,
    pub counts: Vec<f64>,
}

impl Spectrum {
    pub fn new(number: u64, counts: Vec<f64>) -> Self {
        Self { number, counts }
    }
}

/// A named-by-registry, mutable dataset made of spectra.
///
/// The workspace itself does not know its name; names live in the
/// [`WorkspaceRegistry`](crate::core::registry::WorkspaceRegistry), which is the only
/// place names resolve to data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    pub title: String,
    spectra: Vec<Spectrum>,
    history: WorkspaceHistory,
}

impl Workspace {
    /// Creates an empty workspace with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_spectra(title: impl Into<String>, spectra: Vec<Spectrum>) -> Self {
        Self {
            title: title.into(),
            spectra,
            history: WorkspaceHistory::new(),
        }
    }

    /// Creates a rectangular workspace with every count set to `fill`.
    ///
    /// Spectrum numbers are assigned consecutively starting at `first_spectrum_number`.
    pub fn filled(
        title: impl Into<String>,
        num_spectra: usize,
        bins: usize,
        fill: f64,
        first_spectrum_number: u64,
    ) -> Self {
        let spectra = (0..num_spectra)
            .map(|i| Spectrum::new(first_spectrum_number + i as u64, vec![fill; bins]))
            .collect();
        Self::with_spectra(title, spectra)
    }

    /// Number of spectra, the element count index specifications resolve against.
    pub fn size(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Number of counts in the first spectrum, or zero for an empty workspace.
    pub fn bins(&self) -> usize {
        self.spectra.first().map_or(0, |s| s.counts.len())
    }

    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    pub fn spectra_mut(&mut self) -> &mut [Spectrum] {
        &mut self.spectra
    }

    pub fn spectrum(&self, position: usize) -> Option<&Spectrum> {
        self.spectra.get(position)
    }

    pub fn spectrum_mut(&mut self, position: usize) -> Option<&mut Spectrum> {
        self.spectra.get_mut(position)
    }

    pub fn push_spectrum(&mut self, spectrum: Spectrum) {
        self.spectra.push(spectrum);
    }

    pub fn history(&self) -> &WorkspaceHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut WorkspaceHistory {
        &mut self.history
    }

    pub fn set_history(&mut self, history: WorkspaceHistory) {
        self.history = history;
    }
}

impl SpectrumLabels for Workspace {
    fn size(&self) -> usize {
        self.spectra.len()
    }

    fn spectrum_number(&self, position: usize) -> Option<u64> {
        self.spectra.get(position).map(|s| s.number)
    }
}
