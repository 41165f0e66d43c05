//! Attribute schema and the derived reverse schema
//!
//! Attributes carry metadata: value type, cardinality, uniqueness, component
//! flag, AVE indexing, and the tuple declarations. Undeclared attributes are
//! interned on first use with default metadata (cardinality one, no declared
//! type).
//!
//! The reverse schema ([`Rschema`]) is rebuilt whenever the schema changes and
//! answers capability questions in O(1): is this attr a ref, is it unique,
//! which composite tuples does it feed.

use crate::error::{Error, Result};
use crate::keyword::{kw, Keyword};
use crate::value::{Aid, ValueType};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Attribute cardinality
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// Uniqueness constraint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unique {
    #[default]
    None,
    /// Unique value: no two entities may share (a, v)
    Value,
    /// Unique identity: same as value, and enables upsert
    Identity,
}

/// Metadata for one attribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttrSpec {
    pub ident: Keyword,
    /// Declared value type; None means untyped (no validation, no coercion)
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub unique: Unique,
    /// Component refs are retracted recursively with their parent
    #[serde(default)]
    pub component: bool,
    /// Explicitly AVE-indexed
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub no_history: bool,
    /// Composite tuple: source attributes, in order
    #[serde(default)]
    pub tuple_attrs: Option<Vec<Keyword>>,
    /// Homogeneous value tuple element type
    #[serde(default)]
    pub tuple_type: Option<ValueType>,
    /// Heterogeneous value tuple element types
    #[serde(default)]
    pub tuple_types: Option<Vec<ValueType>>,
    /// Interned id, assigned by the schema at declaration
    #[serde(default)]
    pub aid: Aid,
}

impl AttrSpec {
    pub fn new(ident: Keyword) -> Self {
        Self {
            ident,
            value_type: None,
            cardinality: Cardinality::One,
            unique: Unique::None,
            component: false,
            index: false,
            no_history: false,
            tuple_attrs: None,
            tuple_type: None,
            tuple_types: None,
            aid: 0,
        }
    }

    pub fn value_type(mut self, ty: ValueType) -> Self {
        self.value_type = Some(ty);
        self
    }

    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    pub fn unique_value(mut self) -> Self {
        self.unique = Unique::Value;
        self
    }

    pub fn unique_identity(mut self) -> Self {
        self.unique = Unique::Identity;
        self
    }

    pub fn component(mut self) -> Self {
        self.component = true;
        self.value_type = Some(ValueType::Ref);
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn no_history(mut self) -> Self {
        self.no_history = true;
        self
    }

    /// Declare a composite tuple over the given source attributes
    pub fn tuple_attrs(mut self, attrs: impl IntoIterator<Item = Keyword>) -> Self {
        self.tuple_attrs = Some(attrs.into_iter().collect());
        self.value_type = Some(ValueType::Tuple);
        self
    }

    pub fn tuple_type(mut self, ty: ValueType) -> Self {
        self.tuple_type = Some(ty);
        self.value_type = Some(ValueType::Tuple);
        self
    }

    pub fn tuple_types(mut self, tys: impl IntoIterator<Item = ValueType>) -> Self {
        self.tuple_types = Some(tys.into_iter().collect());
        self.value_type = Some(ValueType::Tuple);
        self
    }

    pub fn is_ref(&self) -> bool {
        self.value_type == Some(ValueType::Ref)
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    pub fn is_unique(&self) -> bool {
        self.unique != Unique::None
    }

    pub fn is_composite_tuple(&self) -> bool {
        self.tuple_attrs.is_some()
    }

    /// Whether datoms of this attribute are kept in the AVE index
    pub fn in_ave(&self) -> bool {
        self.index || self.is_unique() || self.is_ref()
    }

    /// Local shape invariants, checked independent of other attributes.
    fn validate_shape(&self) -> Result<()> {
        let declared = [
            self.tuple_attrs.is_some(),
            self.tuple_type.is_some(),
            self.tuple_types.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();

        if self.value_type == Some(ValueType::Tuple) {
            if declared != 1 {
                return Err(Error::bad_attr_spec(
                    &self.ident,
                    "tuple valueType requires exactly one of tupleAttrs, tupleType, tupleTypes",
                ));
            }
        } else if declared != 0 {
            return Err(Error::bad_attr_spec(
                &self.ident,
                "tupleAttrs/tupleType/tupleTypes require valueType tuple",
            ));
        }

        if let Some(sources) = &self.tuple_attrs {
            if sources.is_empty() {
                return Err(Error::bad_attr_spec(&self.ident, "tupleAttrs must be non-empty"));
            }
            if self.cardinality == Cardinality::Many {
                return Err(Error::bad_attr_spec(
                    &self.ident,
                    "tuple attribute cannot be cardinality many",
                ));
            }
        }
        if let Some(tys) = &self.tuple_types {
            if tys.len() < 2 {
                return Err(Error::bad_attr_spec(
                    &self.ident,
                    "tupleTypes must list at least two types",
                ));
            }
        }
        Ok(())
    }
}

/// The full attribute schema
#[derive(Clone, Debug, Default)]
pub struct Schema {
    attrs: FxHashMap<Keyword, AttrSpec>,
    by_aid: FxHashMap<Aid, Keyword>,
    max_aid: Aid,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare or redeclare an attribute; assigns an aid if the spec has none.
    pub fn declare(&mut self, mut spec: AttrSpec) -> Result<()> {
        spec.validate_shape()?;
        if let Some(existing) = self.attrs.get(&spec.ident) {
            spec.aid = existing.aid;
        } else if spec.aid == 0 {
            self.max_aid += 1;
            spec.aid = self.max_aid;
        } else {
            self.max_aid = self.max_aid.max(spec.aid);
        }
        self.by_aid.insert(spec.aid, spec.ident.clone());
        self.attrs.insert(spec.ident.clone(), spec);
        Ok(())
    }

    /// Cross-attribute invariants: composite tuple sources must exist as
    /// non-tuple, cardinality-one attributes. Sources that are undeclared get
    /// interned with defaults (which satisfy both requirements).
    pub fn validate(&mut self) -> Result<()> {
        let tuples: Vec<(Keyword, Vec<Keyword>)> = self
            .attrs
            .values()
            .filter_map(|s| s.tuple_attrs.as_ref().map(|t| (s.ident.clone(), t.clone())))
            .collect();
        for (tuple_attr, sources) in tuples {
            for src in sources {
                let spec = self.ensure(&src).clone();
                if spec.is_composite_tuple() || spec.tuple_type.is_some() || spec.tuple_types.is_some()
                {
                    return Err(Error::bad_attr_spec(
                        &tuple_attr,
                        format!("tupleAttrs cannot reference tuple attribute {src}"),
                    ));
                }
                if spec.is_many() {
                    return Err(Error::bad_attr_spec(
                        &tuple_attr,
                        format!("tupleAttrs cannot reference cardinality-many attribute {src}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Look up a declared attribute
    pub fn attr(&self, ident: &Keyword) -> Option<&AttrSpec> {
        self.attrs.get(ident)
    }

    pub fn attr_by_aid(&self, aid: Aid) -> Option<&AttrSpec> {
        self.by_aid.get(&aid).and_then(|k| self.attrs.get(k))
    }

    /// Look up, interning with default metadata when undeclared.
    pub fn ensure(&mut self, ident: &Keyword) -> &AttrSpec {
        if !self.attrs.contains_key(ident) {
            self.max_aid += 1;
            let mut spec = AttrSpec::new(ident.clone());
            spec.aid = self.max_aid;
            self.by_aid.insert(spec.aid, ident.clone());
            self.attrs.insert(ident.clone(), spec);
        }
        &self.attrs[ident]
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttrSpec> {
        self.attrs.values()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Build the derived reverse schema
    pub fn rschema(&self) -> Rschema {
        let mut r = Rschema::default();
        for spec in self.attrs.values() {
            if spec.is_ref() {
                r.ref_attrs.insert(spec.ident.clone());
            }
            if spec.is_many() {
                r.many_attrs.insert(spec.ident.clone());
            }
            if spec.component {
                r.components.insert(spec.ident.clone());
            }
            if spec.is_unique() {
                r.by_unique.insert(spec.ident.clone());
            }
            if spec.unique == Unique::Identity {
                r.unique_identity.insert(spec.ident.clone());
            }
            if spec.in_ave() {
                r.indexed.insert(spec.ident.clone());
            }
            if let Some(sources) = &spec.tuple_attrs {
                r.tuple_attrs.insert(spec.ident.clone());
                for (pos, src) in sources.iter().enumerate() {
                    r.attr_tuples
                        .entry(src.clone())
                        .or_default()
                        .insert(spec.ident.clone(), pos);
                }
            }
        }
        r
    }
}

/// Reverse schema: capability lookups derived from [`Schema`]
#[derive(Clone, Debug, Default)]
pub struct Rschema {
    pub ref_attrs: FxHashSet<Keyword>,
    pub many_attrs: FxHashSet<Keyword>,
    pub components: FxHashSet<Keyword>,
    /// Attributes with any uniqueness constraint
    pub by_unique: FxHashSet<Keyword>,
    /// Attributes with unique-identity (upsert-enabled)
    pub unique_identity: FxHashSet<Keyword>,
    /// Attributes kept in the AVE index
    pub indexed: FxHashSet<Keyword>,
    /// Attributes that are composite tuples
    pub tuple_attrs: FxHashSet<Keyword>,
    /// Source attr -> (composite tuple attr -> position of source)
    pub attr_tuples: FxHashMap<Keyword, FxHashMap<Keyword, usize>>,
}

impl Rschema {
    pub fn is_ref(&self, a: &Keyword) -> bool {
        self.ref_attrs.contains(a)
    }

    pub fn is_many(&self, a: &Keyword) -> bool {
        self.many_attrs.contains(a)
    }

    pub fn is_unique(&self, a: &Keyword) -> bool {
        self.by_unique.contains(a)
    }

    pub fn is_unique_identity(&self, a: &Keyword) -> bool {
        self.unique_identity.contains(a)
    }

    pub fn is_component(&self, a: &Keyword) -> bool {
        self.components.contains(a)
    }

    pub fn in_ave(&self, a: &Keyword) -> bool {
        self.indexed.contains(a)
    }

    pub fn is_tuple_attr(&self, a: &Keyword) -> bool {
        self.tuple_attrs.contains(a)
    }

    /// Composite tuples this source attribute participates in
    pub fn tuples_of(&self, a: &Keyword) -> Option<&FxHashMap<Keyword, usize>> {
        self.attr_tuples.get(a)
    }
}

/// Entity timestamp attribute injected when `auto_entity_time` is on
pub fn created_at_ident() -> Keyword {
    kw(":db/created-at")
}

/// Entity timestamp attribute injected when `auto_entity_time` is on
pub fn updated_at_ident() -> Keyword {
    kw(":db/updated-at")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_assigns_aids() {
        let mut s = Schema::new();
        s.declare(AttrSpec::new(kw(":name")).value_type(ValueType::String))
            .unwrap();
        s.declare(AttrSpec::new(kw(":age")).value_type(ValueType::Long))
            .unwrap();
        let name = s.attr(&kw(":name")).unwrap();
        let age = s.attr(&kw(":age")).unwrap();
        assert_ne!(name.aid, 0);
        assert_ne!(age.aid, name.aid);
        assert_eq!(s.attr_by_aid(name.aid).unwrap().ident, kw(":name"));
    }

    #[test]
    fn test_tuple_requires_exactly_one_declaration() {
        let mut s = Schema::new();
        // none of the three
        let mut bare = AttrSpec::new(kw(":t"));
        bare.value_type = Some(ValueType::Tuple);
        assert!(s.declare(bare).is_err());

        // two of the three
        let mut both = AttrSpec::new(kw(":t")).tuple_type(ValueType::Long);
        both.tuple_attrs = Some(vec![kw(":a")]);
        assert!(s.declare(both).is_err());

        assert!(s
            .declare(AttrSpec::new(kw(":t")).tuple_type(ValueType::Long))
            .is_ok());
    }

    #[test]
    fn test_tuple_attr_invariants() {
        let mut s = Schema::new();
        assert!(s
            .declare(AttrSpec::new(kw(":a+b")).tuple_attrs(vec![]))
            .is_err());
        assert!(s
            .declare(AttrSpec::new(kw(":a+b")).tuple_attrs(vec![kw(":a"), kw(":b")]).many())
            .is_err());

        s.declare(AttrSpec::new(kw(":a+b")).tuple_attrs(vec![kw(":a"), kw(":b")]))
            .unwrap();
        s.validate().unwrap();

        // a tuple attr may not source another tuple attr
        s.declare(AttrSpec::new(kw(":t+t")).tuple_attrs(vec![kw(":a+b")]))
            .unwrap();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_tuple_attr_rejects_many_source() {
        let mut s = Schema::new();
        s.declare(AttrSpec::new(kw(":aliases")).value_type(ValueType::String).many())
            .unwrap();
        s.declare(AttrSpec::new(kw(":x")).tuple_attrs(vec![kw(":aliases")]))
            .unwrap();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_rschema() {
        let mut s = Schema::new();
        s.declare(
            AttrSpec::new(kw(":friend"))
                .value_type(ValueType::Ref)
                .many(),
        )
        .unwrap();
        s.declare(AttrSpec::new(kw(":email")).value_type(ValueType::String).unique_identity())
            .unwrap();
        s.declare(AttrSpec::new(kw(":a+b")).tuple_attrs(vec![kw(":a"), kw(":b")]))
            .unwrap();
        s.validate().unwrap();
        let r = s.rschema();

        assert!(r.is_ref(&kw(":friend")));
        assert!(r.is_many(&kw(":friend")));
        assert!(r.in_ave(&kw(":friend")));
        assert!(r.is_unique_identity(&kw(":email")));
        assert!(r.is_tuple_attr(&kw(":a+b")));
        assert_eq!(r.tuples_of(&kw(":a")).unwrap()[&kw(":a+b")], 0);
        assert_eq!(r.tuples_of(&kw(":b")).unwrap()[&kw(":a+b")], 1);
    }
}
