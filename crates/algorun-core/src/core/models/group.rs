use serde::Serialize;

/// An ordered collection of workspace names registered under its own name.
///
/// Member order is significant: during group fan-out, position `i` of one group is
/// paired with position `i` of every other group. A *multiperiod* group is treated as
/// one logical dataset and is never broadcast over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceGroup {
    members: Vec<String>,
    multiperiod: bool,
}

impl WorkspaceGroup {
    /// Creates an ordinary group, eligible for fan-out.
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            multiperiod: false,
        }
    }

    /// Creates a multiperiod group, executed as a single atomic dataset.
    pub fn multiperiod<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            multiperiod: true,
            ..Self::new(members)
        }
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_multiperiod(&self) -> bool {
        self.multiperiod
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    pub fn member(&self, position: usize) -> Option<&str> {
        self.members.get(position).map(String::as_str)
    }

    /// Member paired with fan-out iteration `iteration`.
    ///
    /// A single-member group is broadcast: its sole member pairs with every iteration.
    pub fn member_for_iteration(&self, iteration: usize) -> Option<&str> {
        match self.members.len() {
            1 => self.member(0),
            _ => self.member(iteration),
        }
    }

    pub(crate) fn remove_member(&mut self, name: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != name);
        self.members.len() != before
    }
}
