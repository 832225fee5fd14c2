//! Data paths
//!
//! A path addresses a component's value inside the submission data. A path
//! crossing a repeating component (data grid, edit grid, multiple value)
//! carries an [`PathSegment::Each`] marker and addresses one value per row.

use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    /// Every element of a list
    Each,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DataPath {
    segments: Vec<PathSegment>,
}

impl DataPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a rendered path such as `grid[].name` or `a.b`.
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        for part in text.split('.').filter(|p| !p.is_empty()) {
            let mut rest = part;
            let mut markers = 0;
            while let Some(stripped) = rest.strip_suffix("[]") {
                rest = stripped;
                markers += 1;
            }
            if !rest.is_empty() {
                segments.push(PathSegment::Key(rest.to_string()));
            }
            segments.extend(std::iter::repeat(PathSegment::Each).take(markers));
        }
        Self { segments }
    }

    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self { segments }
    }

    pub fn each(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Each);
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the path crosses a repeating component.
    pub fn is_repeating(&self) -> bool {
        self.segments.contains(&PathSegment::Each)
    }

    /// Resolves a single value. Repeating paths have no single value.
    pub fn get<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        let mut current = data;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => current = current.as_object()?.get(key)?,
                PathSegment::Each => return None,
            }
        }
        Some(current)
    }

    /// Removes the addressed value, from every row for repeating paths.
    pub fn remove(&self, data: &mut Value) {
        remove_at(data, &self.segments);
    }

    /// Dotted form for store queries; `None` for repeating paths.
    pub fn dotted(&self) -> Option<String> {
        if self.is_repeating() {
            return None;
        }
        Some(self.to_string())
    }
}

fn remove_at(value: &mut Value, segments: &[PathSegment]) {
    match segments {
        [] => {}
        [PathSegment::Key(key)] => {
            if let Some(obj) = value.as_object_mut() {
                obj.remove(key);
            }
        }
        [PathSegment::Key(key), rest @ ..] => {
            if let Some(child) = value.as_object_mut().and_then(|obj| obj.get_mut(key)) {
                remove_at(child, rest);
            }
        }
        [PathSegment::Each, rest @ ..] => {
            if let Some(items) = value.as_array_mut() {
                for item in items {
                    remove_at(item, rest);
                }
            }
        }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", key)?;
                }
                PathSegment::Each => write!(f, "[]")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// Looks up a loosely written path (`a.b[0].c`) in a JSON document.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for part in path.split('.').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, indexes) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            current = current.get(name)?;
        }
        for index in indexes.split('[').filter(|s| !s.is_empty()) {
            let index = index.trim_end_matches(']').trim();
            current = match index.parse::<usize>() {
                Ok(i) => current.get(i)?,
                Err(_) => current.get(index.trim_matches(|c| c == '"' || c == '\''))?,
            };
        }
    }
    Some(current)
}
