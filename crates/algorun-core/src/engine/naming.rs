use itertools::Itertools;
use serde::Serialize;

/// How the members of a fan-out output group are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputNaming {
    /// The output reuses an input group; member `i` keeps the input member's name.
    InPlace,
    /// Every input group is named `<prefix><sep><n>`; outputs become `<base><sep><n>`.
    NumericSuffix,
    /// Member names of every input group at position `i`, then the base, joined by the
    /// separator.
    Concatenate,
}

/// An input group as seen by the naming rules.
#[derive(Debug, Clone, Copy)]
pub struct NamingInput<'a> {
    pub group: &'a str,
    pub members: &'a [String],
}

impl NamingInput<'_> {
    fn member_for_iteration(&self, iteration: usize) -> &str {
        let position = if self.members.len() == 1 { 0 } else { iteration };
        self.members.get(position).map_or("", String::as_str)
    }
}

/// True if member `i` of `members` is `<prefix><separator><i + 1>` for one shared,
/// non-empty prefix.
pub fn has_numeric_suffix_pattern(members: &[String], separator: char) -> bool {
    let mut prefix = None;
    for (i, member) in members.iter().enumerate() {
        let suffix = format!("{separator}{}", i + 1);
        let Some(stem) = member.strip_suffix(&suffix) else {
            return false;
        };
        if stem.is_empty() {
            return false;
        }
        match prefix {
            None => prefix = Some(stem),
            Some(p) if p == stem => {}
            Some(_) => return false,
        }
    }
    prefix.is_some()
}

/// Picks the naming rule for one output group.
///
/// `size` is the fan-out length. Reusing an input group's name is in-place only when that
/// group has a member for every iteration.
pub fn choose_naming(
    base: &str,
    inputs: &[NamingInput<'_>],
    size: usize,
    separator: char,
) -> OutputNaming {
    if inputs
        .iter()
        .any(|input| input.group == base && input.members.len() == size)
    {
        return OutputNaming::InPlace;
    }
    let patterned = !inputs.is_empty()
        && inputs
            .iter()
            .all(|input| has_numeric_suffix_pattern(input.members, separator));
    if patterned && inputs.iter().all(|input| input.group != base) {
        OutputNaming::NumericSuffix
    } else {
        OutputNaming::Concatenate
    }
}

/// Name of the output workspace produced by fan-out iteration `iteration`.
pub fn member_output_name(
    naming: OutputNaming,
    base: &str,
    inputs: &[NamingInput<'_>],
    iteration: usize,
    separator: char,
) -> String {
    match naming {
        OutputNaming::InPlace => inputs
            .iter()
            .find(|input| input.group == base)
            .map(|input| input.member_for_iteration(iteration).to_string())
            .unwrap_or_else(|| format!("{base}{separator}{}", iteration + 1)),
        OutputNaming::NumericSuffix => format!("{base}{separator}{}", iteration + 1),
        OutputNaming::Concatenate => inputs
            .iter()
            .map(|input| input.member_for_iteration(iteration))
            .chain(std::iter::once(base))
            .join(&separator.to_string()),
    }
}
