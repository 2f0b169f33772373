//! Graph codec for scripture trees.
//!
//! The codec turns a graph of polymorphic scripture nodes into a textual
//! tree document and reconstructs it later. Concrete run-time types travel
//! as persisted tags resolved through the schema registry, shared plain
//! composites keep their identity through id and back-reference attributes,
//! value fields are filtered by visibility tier, and every node's integrity
//! digest rides along to be handed back through the post-decode hook.
//!
//! The codec value itself is stateless; each call builds its own identity
//! context, so one codec can be shared freely.
//!
//! # Example
//!
//! ```
//! use scribe_codec::Codec;
//! use scribe_schema::info::NodeSchema;
//! use scribe_schema::node::Scripture;
//! use scribe_schema::registry::SchemaRegistry;
//!
//! #[derive(Default)]
//! struct Psalm {
//!     count: i32,
//! }
//!
//! impl Scripture for Psalm {}
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .register_node(
//!         NodeSchema::builder::<Psalm>("liturgy/psalm")
//!             .public("Count", |p: &Psalm| Some(p.count), |p, v| p.count = v)
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let codec = Codec::new(&registry);
//! let text = codec.encode(&Psalm { count: 3 }, false).unwrap();
//! let back = codec.decode::<Psalm>(&text).unwrap();
//! assert_eq!(back.count, 3);
//! ```

// -----------------------------------------------------------------------------
// Modules

pub mod error;
pub mod reconcile;

mod de;
mod ser;
mod wire;

pub use error::{BoxError, CodecError};
pub use reconcile::{Reconciled, reconcile};

use scribe_schema::Scripture;
use scribe_schema::info::NodeKind;
use scribe_schema::registry::SchemaRegistry;

// -----------------------------------------------------------------------------
// Codec

/// The graph codec.
///
/// Borrows the schema registry it consults; it holds no per-call state of
/// its own and can be reused across calls.
pub struct Codec<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Codec<'r> {
    #[inline]
    pub const fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Encodes a node graph into a document.
    ///
    /// Secret-tier value fields are written only when `include_secrets` is
    /// set; the setting itself is recorded in the document wrapper and
    /// drives the matching filter on decode.
    pub fn encode(
        &self,
        node: &dyn Scripture,
        include_secrets: bool,
    ) -> Result<String, CodecError> {
        log::trace!(
            "encoding `{}` (include_secrets: {include_secrets})",
            node.type_name()
        );
        ser::Encoder::new(self.registry, include_secrets).encode(node)
    }

    /// Decodes a document whose root must be exactly `T`.
    pub fn decode<T: Scripture>(&self, text: &str) -> Result<Box<T>, CodecError> {
        let expected = NodeKind::of::<T>();
        log::trace!("decoding a `{}` document", expected.name());
        let node = de::Decoder::decode(self.registry, text, &de::Expectation::Exactly(expected))?;
        node.into_any().downcast::<T>().map_err(|_| {
            CodecError::mismatch(
                format!("a `{}` root node", expected.name()),
                "another node type",
            )
        })
    }

    /// Decodes a document whose root may be any node satisfying `expected`.
    ///
    /// This is the polymorphic entry point; the resolved type's base chain
    /// must reach `expected` or the call fails before anything is built.
    pub fn decode_dyn(
        &self,
        text: &str,
        expected: NodeKind,
    ) -> Result<Box<dyn Scripture>, CodecError> {
        log::trace!("decoding a document satisfying `{}`", expected.name());
        de::Decoder::decode(self.registry, text, &de::Expectation::Satisfying(expected))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde::{Deserialize, Serialize};

    use scribe_schema::info::{
        CompositeSchema, EnumSchema, NodeKind, NodeSchema, OpaqueCodec, SequenceSchema,
    };
    use scribe_schema::node::{HookError, Scripture, Shared};
    use scribe_schema::registry::{ResolveError, SchemaRegistry};

    use super::{Codec, CodecError};

    // -------------------------------------------------------------------------
    // Fixture domain

    struct ChapterMark;

    struct Psalm {
        count: i32,
        token: String,
        digest: Vec<u8>,
        hook_runs: u32,
        hook_secrets: Option<bool>,
    }

    impl Default for Psalm {
        fn default() -> Self {
            Self {
                count: 0,
                token: "xyz".to_owned(),
                digest: Vec::new(),
                hook_runs: 0,
                hook_secrets: None,
            }
        }
    }

    impl Scripture for Psalm {
        fn digest(&self) -> &[u8] {
            &self.digest
        }

        fn decoded(&mut self, digest: &[u8], secrets_included: bool) -> Result<(), HookError> {
            self.digest = digest.to_vec();
            self.hook_runs += 1;
            self.hook_secrets = Some(secrets_included);
            Ok(())
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    enum Mode {
        #[default]
        Plain,
        Ornate,
    }

    const MODES: &[(&str, Mode)] = &[("Plain", Mode::Plain), ("Ornate", Mode::Ornate)];

    struct Canticle {
        title: String,
        mode: Mode,
    }

    impl Default for Canticle {
        fn default() -> Self {
            Self {
                title: "untitled".to_owned(),
                mode: Mode::Plain,
            }
        }
    }

    impl Scripture for Canticle {}

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Colophon {
        press: String,
        year: i32,
    }

    #[derive(Default)]
    struct Gloss {
        note: String,
        next: Option<Shared<Gloss>>,
    }

    #[derive(Default)]
    struct Book {
        heading: String,
        readings: Vec<i64>,
        spans: Box<[u16]>,
        margins: Shared<Vec<i32>>,
        colophon: Colophon,
        left: Option<Shared<Gloss>>,
        right: Option<Shared<Gloss>>,
        opening: Psalm,
        chapters: Vec<Box<dyn Scripture>>,
    }

    impl Scripture for Book {}

    #[derive(Default)]
    struct Cursed;

    impl Scripture for Cursed {
        fn decoded(&mut self, _digest: &[u8], _secrets: bool) -> Result<(), HookError> {
            Err("the seal is broken".into())
        }
    }

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register_abstract::<ChapterMark>().unwrap();

        registry
            .register_node(
                NodeSchema::builder::<Psalm>("scribe/psalm")
                    .base::<ChapterMark>()
                    .public("Count", |p: &Psalm| Some(p.count), |p, v| p.count = v)
                    .secret(
                        "Token",
                        |p: &Psalm| Some(p.token.clone()),
                        |p, v| p.token = v,
                    )
                    .build(),
            )
            .unwrap();

        registry
            .register_node(
                NodeSchema::builder::<Canticle>("scribe/canticle")
                    .base::<ChapterMark>()
                    .public(
                        "Title",
                        |c: &Canticle| Some(c.title.clone()),
                        |c, v| c.title = v,
                    )
                    .public("Mode", |c: &Canticle| Some(c.mode.clone()), |c, v| c.mode = v)
                    .build(),
            )
            .unwrap();

        registry
            .register_node(
                NodeSchema::builder::<Book>("scribe/book")
                    .public(
                        "Heading",
                        |b: &Book| Some(b.heading.clone()),
                        |b, v| b.heading = v,
                    )
                    .public(
                        "Readings",
                        |b: &Book| Some(b.readings.clone()),
                        |b, v| b.readings = v,
                    )
                    .public("Spans", |b: &Book| Some(b.spans.clone()), |b, v| b.spans = v)
                    .public(
                        "Margins",
                        |b: &Book| Some(b.margins.clone()),
                        |b, v| b.margins = v,
                    )
                    .public(
                        "Colophon",
                        |b: &Book| Some(b.colophon.clone()),
                        |b, v| b.colophon = v,
                    )
                    .public("Left", |b: &Book| b.left.clone(), |b, v| b.left = Some(v))
                    .public("Right", |b: &Book| b.right.clone(), |b, v| b.right = Some(v))
                    .single("Opening", |b: &Book| &b.opening, |b, v| b.opening = v)
                    .collection_dyn(
                        "Chapters",
                        NodeKind::of::<ChapterMark>(),
                        |b: &Book| &b.chapters,
                        |b: &mut Book| &mut b.chapters,
                    )
                    .build(),
            )
            .unwrap();

        registry
            .register_node(NodeSchema::builder::<Cursed>("scribe/cursed").build())
            .unwrap();

        registry.register_sequence(SequenceSchema::vec::<i64>());
        registry.register_sequence(SequenceSchema::boxed_slice::<u16>());
        registry.register_sequence(SequenceSchema::shared_vec::<i32>());

        registry
            .register_composite(
                CompositeSchema::of::<Gloss>()
                    .field("Note", |g: &Gloss| Some(g.note.clone()), |g, v| g.note = v)
                    .field("Next", |g: &Gloss| g.next.clone(), |g, v| g.next = Some(v))
                    .build(),
            )
            .unwrap();

        registry.register_enum(EnumSchema::of(MODES));
        registry.register_opaque(OpaqueCodec::serde::<Colophon>());
        registry
    }

    fn sample_book() -> Book {
        let margin_gloss = scribe_schema::shared(Gloss {
            note: "in the beginning".to_owned(),
            next: None,
        });
        Book {
            heading: "Liber Primus".to_owned(),
            readings: vec![40, -3, 12],
            spans: vec![7_u16, 9, 2].into_boxed_slice(),
            margins: scribe_schema::shared(vec![1_i32, 2]),
            colophon: Colophon {
                press: "Aldine".to_owned(),
                year: 1501,
            },
            left: Some(margin_gloss.clone()),
            right: Some(margin_gloss),
            opening: Psalm {
                count: 3,
                token: "abc".to_owned(),
                digest: vec![7, 7, 7],
                ..Psalm::default()
            },
            chapters: vec![
                Box::new(Psalm {
                    count: 11,
                    token: "hidden".to_owned(),
                    digest: vec![1, 2],
                    ..Psalm::default()
                }),
                Box::new(Canticle {
                    title: "Benedicite".to_owned(),
                    mode: Mode::Ornate,
                }),
            ],
        }
    }

    // -------------------------------------------------------------------------
    // Round trips

    #[test]
    fn psalm_round_trips_with_secrets() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let psalm = Psalm {
            count: 3,
            token: "abc".to_owned(),
            digest: vec![9, 8, 7],
            ..Psalm::default()
        };
        let text = codec.encode(&psalm, true).unwrap();
        let back = codec.decode::<Psalm>(&text).unwrap();

        assert_eq!(back.count, 3);
        assert_eq!(back.token, "abc");
        assert_eq!(back.digest, [9, 8, 7]);
        assert_eq!(back.hook_runs, 1);
        assert_eq!(back.hook_secrets, Some(true));
    }

    #[test]
    fn excluded_secrets_are_absent_and_untouched() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let psalm = Psalm {
            count: 3,
            token: "abc".to_owned(),
            ..Psalm::default()
        };
        let text = codec.encode(&psalm, false).unwrap();

        assert!(text.contains("<Count>3</Count>"));
        assert!(!text.contains("Token"));
        assert!(!text.contains("abc"));

        // The fresh node starts with `Token` preset to "xyz" and keeps it.
        let back = codec.decode::<Psalm>(&text).unwrap();
        assert_eq!(back.count, 3);
        assert_eq!(back.token, "xyz");
        assert_eq!(back.hook_secrets, Some(false));
    }

    #[test]
    fn book_round_trips_completely() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec.encode(&sample_book(), true).unwrap();
        let back = codec.decode::<Book>(&text).unwrap();

        assert_eq!(back.heading, "Liber Primus");
        assert_eq!(back.readings, [40, -3, 12]);
        assert_eq!(&*back.spans, &[7, 9, 2]);
        assert_eq!(back.margins.borrow().as_slice(), [1, 2]);
        assert_eq!(
            back.colophon,
            Colophon {
                press: "Aldine".to_owned(),
                year: 1501,
            }
        );
        assert_eq!(back.opening.count, 3);
        assert_eq!(back.opening.token, "abc");
        assert_eq!(back.opening.digest, [7, 7, 7]);
        assert_eq!(back.opening.hook_runs, 1);
        assert_eq!(back.chapters.len(), 2);
    }

    #[test]
    fn collection_items_carry_the_declared_kind_name() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec.encode(&sample_book(), true).unwrap();
        // The run-time type travels in the tag attribute only.
        assert!(text.contains("<ChapterMark "));
        assert!(text.contains("scribe/canticle"));
    }

    #[test]
    fn polymorphic_chapters_keep_their_runtime_types() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec.encode(&sample_book(), true).unwrap();
        let back = codec.decode::<Book>(&text).unwrap();

        let psalm = back.chapters[0].as_any().downcast_ref::<Psalm>().unwrap();
        assert_eq!(psalm.count, 11);
        assert_eq!(psalm.token, "hidden");
        assert_eq!(psalm.hook_runs, 1);

        let canticle = back.chapters[1]
            .as_any()
            .downcast_ref::<Canticle>()
            .unwrap();
        assert_eq!(canticle.title, "Benedicite");
        assert_eq!(canticle.mode, Mode::Ornate);
    }

    #[test]
    fn decode_dyn_accepts_any_node_satisfying_the_kind() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let psalm = Psalm {
            count: 5,
            ..Psalm::default()
        };
        let text = codec.encode(&psalm, true).unwrap();
        let back = codec
            .decode_dyn(&text, NodeKind::of::<ChapterMark>())
            .unwrap();
        let back = back.into_any().downcast::<Psalm>().unwrap();
        assert_eq!(back.count, 5);
    }

    // -------------------------------------------------------------------------
    // Shared references and cycles

    #[test]
    fn shared_composites_encode_one_inline_and_one_reference() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec.encode(&sample_book(), true).unwrap();
        assert_eq!(text.matches(" id=\"").count(), 1);
        assert_eq!(text.matches(" ref=\"").count(), 1);
    }

    #[test]
    fn shared_composites_decode_to_one_instance() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec.encode(&sample_book(), true).unwrap();
        let back = codec.decode::<Book>(&text).unwrap();

        let left = back.left.as_ref().unwrap();
        let right = back.right.as_ref().unwrap();
        assert!(Rc::ptr_eq(left, right));
        assert_eq!(left.borrow().note, "in the beginning");
    }

    #[test]
    fn cyclic_composites_round_trip() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let a = scribe_schema::shared(Gloss {
            note: "alef".to_owned(),
            next: None,
        });
        let b = scribe_schema::shared(Gloss {
            note: "bet".to_owned(),
            next: Some(a.clone()),
        });
        a.borrow_mut().next = Some(b);

        let book = Book {
            left: Some(a),
            ..Book::default()
        };
        let text = codec.encode(&book, true).unwrap();
        let back = codec.decode::<Book>(&text).unwrap();

        let a2 = back.left.clone().unwrap();
        let b2 = a2.borrow().next.clone().unwrap();
        let around = b2.borrow().next.clone().unwrap();
        assert!(Rc::ptr_eq(&a2, &around));
        assert_eq!(a2.borrow().note, "alef");
        assert_eq!(b2.borrow().note, "bet");
    }

    #[test]
    fn dangling_references_are_fatal() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let mut text = codec.encode(&sample_book(), true).unwrap();
        let start = text.find(" ref=\"").unwrap() + 6;
        text.replace_range(start..start + 36, "00000000-0000-0000-0000-000000000000");

        assert!(matches!(
            codec.decode::<Book>(&text),
            Err(CodecError::UnresolvedReference { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Type-tag gating

    #[test]
    fn spoofed_root_tags_are_rejected_before_construction() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec
            .encode(&Psalm { count: 1, ..Psalm::default() }, true)
            .unwrap();
        assert!(matches!(
            codec.decode::<Canticle>(&text),
            Err(CodecError::Resolve(ResolveError::Incompatible { .. }))
        ));
        assert!(matches!(
            codec.decode_dyn(&text, NodeKind::of::<Book>()),
            Err(CodecError::Resolve(ResolveError::Incompatible { .. }))
        ));
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec
            .encode(&Psalm::default(), true)
            .unwrap()
            .replace("scribe/psalm", "scribe/unheard");
        assert!(matches!(
            codec.decode::<Psalm>(&text),
            Err(CodecError::Resolve(ResolveError::UnknownTag { .. }))
        ));
    }

    // -------------------------------------------------------------------------
    // Strictness

    #[test]
    fn renamed_elements_are_a_schema_mismatch() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec
            .encode(&Psalm::default(), true)
            .unwrap()
            .replace("Count>", "Chant>");
        assert!(matches!(
            codec.decode::<Psalm>(&text),
            Err(CodecError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn trailing_elements_are_a_schema_mismatch() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec
            .encode(&Psalm::default(), true)
            .unwrap()
            .replace("</Psalm>", "<Apocrypha/></Psalm>");
        assert!(matches!(
            codec.decode::<Psalm>(&text),
            Err(CodecError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn unparseable_scalars_are_a_conversion_error() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec
            .encode(&Psalm { count: 3, ..Psalm::default() }, true)
            .unwrap()
            .replace("<Count>3</Count>", "<Count>three</Count>");
        assert!(matches!(
            codec.decode::<Psalm>(&text),
            Err(CodecError::Conversion(_))
        ));
    }

    #[test]
    fn unknown_enum_symbols_are_a_conversion_error() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec
            .encode(
                &Canticle {
                    mode: Mode::Ornate,
                    ..Canticle::default()
                },
                true,
            )
            .unwrap()
            .replace(">Ornate<", ">Gilded<");
        assert!(matches!(
            codec.decode::<Canticle>(&text),
            Err(CodecError::Conversion(_))
        ));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let registry = registry();
        let codec = Codec::new(&registry);
        assert!(matches!(
            codec.decode::<Psalm>("<Scripture secretsIncluded="),
            Err(CodecError::Malformed(_))
        ));
    }

    // -------------------------------------------------------------------------
    // Channel policing

    #[test]
    fn nodes_in_the_value_channel_are_misplaced() {
        let mut registry = registry();

        #[derive(Default)]
        struct Broken {
            inner: Option<()>,
        }
        impl Scripture for Broken {}

        registry
            .register_node(
                NodeSchema::builder::<Broken>("scribe/broken")
                    .public(
                        "Inner",
                        |_: &Broken| Some(Psalm::default()),
                        |b, _: Psalm| b.inner = Some(()),
                    )
                    .build(),
            )
            .unwrap();

        let codec = Codec::new(&registry);
        assert!(matches!(
            codec.encode(&Broken::default(), true),
            Err(CodecError::MisplacedNode { .. })
        ));
    }

    #[test]
    fn failing_hooks_abort_the_decode() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec.encode(&Cursed, true).unwrap();
        assert!(matches!(
            codec.decode::<Cursed>(&text),
            Err(CodecError::Hook { node: "Cursed", .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Null and empty forms

    #[test]
    fn absent_values_stay_absent() {
        let registry = registry();
        let codec = Codec::new(&registry);

        let text = codec.encode(&Book::default(), true).unwrap();
        let back = codec.decode::<Book>(&text).unwrap();
        assert!(back.left.is_none());
        assert!(back.right.is_none());
    }

    #[test]
    fn empty_strings_collapse_to_the_preset_value() {
        let registry = registry();
        let codec = Codec::new(&registry);

        // An empty text form and an absent value share one wire shape, so
        // the decoded node keeps its constructed default.
        let text = codec
            .encode(
                &Canticle {
                    title: String::new(),
                    mode: Mode::Plain,
                },
                true,
            )
            .unwrap();
        let back = codec.decode::<Canticle>(&text).unwrap();
        assert_eq!(back.title, "untitled");
    }
}
