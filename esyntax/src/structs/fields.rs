//! Named field sets of parsed structures.
//!
//! A [`FieldSet`] flattens a structure into `(name, value)` pairs using the
//! syntax-diagram names: arrays become `name[i]`, nested structures become
//! `outer.inner` and absent optional groups contribute nothing. Implementations
//! are derived with `#[derive(FieldSet)]`.

use crate::utils::syntax_log::FieldValue;

pub use esyntax_macros::FieldSet;

pub type FieldList = Vec<(String, FieldValue)>;

pub trait FieldSet {
    fn collect_fields(&self, prefix: &str, out: &mut FieldList);

    fn fields(&self) -> FieldList {
        let mut out = Vec::new();
        self.collect_fields("", &mut out);
        out
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// A value that contributes one or more entries to a field set.
pub trait FieldSetValue {
    fn collect_into(&self, name: &str, out: &mut FieldList);
}

macro_rules! impl_field_value {
    ($variant:ident, $wide:ty, $($t:ty),+) => { $(
        impl FieldSetValue for $t {
            #[inline]
            fn collect_into(&self, name: &str, out: &mut FieldList) {
                out.push((name.to_string(), FieldValue::$variant(*self as $wide)));
            }
        }
    )+ }
}

impl_field_value!(Unsigned, u64, u8, u16, u32, u64);
impl_field_value!(Signed, i64, i8, i16, i32, i64);

impl FieldSetValue for bool {
    fn collect_into(&self, name: &str, out: &mut FieldList) {
        out.push((name.to_string(), FieldValue::Flag(*self)));
    }
}

impl<T: FieldSetValue, const N: usize> FieldSetValue for [T; N] {
    fn collect_into(&self, name: &str, out: &mut FieldList) {
        for (i, item) in self.iter().enumerate() {
            item.collect_into(&format!("{name}[{i}]"), out);
        }
    }
}

impl<T: FieldSetValue> FieldSetValue for Vec<T> {
    fn collect_into(&self, name: &str, out: &mut FieldList) {
        for (i, item) in self.iter().enumerate() {
            item.collect_into(&format!("{name}[{i}]"), out);
        }
    }
}

impl<T: FieldSetValue> FieldSetValue for Option<T> {
    fn collect_into(&self, name: &str, out: &mut FieldList) {
        if let Some(value) = self {
            value.collect_into(name, out);
        }
    }
}

/// Opaque byte payloads appear as a single entry carrying their size.
impl FieldSetValue for Box<[u8]> {
    fn collect_into(&self, name: &str, out: &mut FieldList) {
        out.push((name.to_string(), FieldValue::Payload((self.len() as u64) << 3)));
    }
}

#[cfg(test)]
#[derive(FieldSet)]
struct Inner {
    a: u8,
    #[field(rename = "b_flag")]
    b: bool,
}

#[cfg(test)]
#[derive(FieldSet)]
struct Outer {
    f_code: [[u8; 2]; 2],
    inner: Option<Inner>,
    missing: Option<Inner>,
    #[field(skip)]
    _internal: u32,
    delta: i16,
    data: Box<[u8]>,
}

#[test]
fn derived_field_names() {
    let outer = Outer {
        f_code: [[1, 2], [3, 4]],
        inner: Some(Inner { a: 7, b: true }),
        missing: None,
        _internal: 99,
        delta: -3,
        data: vec![0u8; 5].into_boxed_slice(),
    };

    let names = outer
        .fields()
        .into_iter()
        .map(|(n, _)| n)
        .collect::<Vec<_>>();

    assert_eq!(
        names,
        [
            "f_code[0][0]",
            "f_code[0][1]",
            "f_code[1][0]",
            "f_code[1][1]",
            "inner.a",
            "inner.b_flag",
            "delta",
            "data",
        ]
    );

    assert_eq!(outer.field("f_code[1][0]"), Some(FieldValue::Unsigned(3)));
    assert_eq!(outer.field("inner.b_flag"), Some(FieldValue::Flag(true)));
    assert_eq!(outer.field("delta"), Some(FieldValue::Signed(-3)));
    assert_eq!(outer.field("data"), Some(FieldValue::Payload(40)));
    assert_eq!(outer.field("_internal"), None);
}
