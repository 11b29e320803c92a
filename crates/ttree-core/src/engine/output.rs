use std::collections::HashMap;

pub const DATA_ATOMS: &str = "Data Atoms";
pub const DATA_ELLIPSOIDS: &str = "Data Ellipsoids";
pub const DATA_MASSES: &str = "Data Masses";

/// Rendered text grouped by output channel.
///
/// Each channel keeps its fragments in emission order; channels iterate in the
/// order they were first written to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    order: Vec<String>,
    fragments: HashMap<String, Vec<String>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: &str, text: String) {
        match self.fragments.get_mut(channel) {
            Some(list) => list.push(text),
            None => {
                self.order.push(channel.to_string());
                self.fragments.insert(channel.to_string(), vec![text]);
            }
        }
    }

    pub fn fragments(&self, channel: &str) -> &[String] {
        self.fragments.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fragments_mut(&mut self, channel: &str) -> Option<&mut Vec<String>> {
        self.fragments.get_mut(channel)
    }

    /// The channel's full text, or `None` if it was never written.
    pub fn text(&self, channel: &str) -> Option<String> {
        self.fragments.get(channel).map(|f| f.concat())
    }

    pub fn has_content(&self, channel: &str) -> bool {
        self.fragments(channel)
            .iter()
            .any(|f| !f.trim().is_empty())
    }

    /// Appends every fragment of `child` after this set's own fragments.
    pub fn absorb(&mut self, child: ChannelSet) {
        let ChannelSet {
            order,
            mut fragments,
        } = child;
        for channel in order {
            if let Some(list) = fragments.remove(&channel) {
                for text in list {
                    self.push(&channel, text);
                }
            }
        }
    }

    /// `(channel, text)` pairs in first-write order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.order.iter().map(move |name| {
            let text = self.fragments.get(name).map(|f| f.concat()).unwrap_or_default();
            (name.as_str(), text)
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
