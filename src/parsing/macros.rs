use indexmap::IndexMap;

/// Macro definitions visible while parsing one file.
///
/// Later definitions replace earlier ones with the same name, so callers
/// layer sources from least to most specific.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroContext {
    defines: IndexMap<String, String>,
}

impl MacroContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defines.insert(name.into(), value.into());
    }

    pub fn undefine(&mut self, name: &str) {
        self.defines.shift_remove(name);
    }

    pub fn clear(&mut self) {
        self.defines.clear();
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.defines.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.defines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for MacroContext {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.define(name, value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MacroContext {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut ctx = MacroContext::new();
        ctx.extend(iter);
        ctx
    }
}
