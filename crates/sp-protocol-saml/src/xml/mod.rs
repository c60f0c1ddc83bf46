//! XML document model and canonicalization.
//!
//! Signature verification needs the document exactly as received: every
//! whitespace text node, every namespace declaration at the place it was
//! written. [`Document`] keeps all of that; [`canonicalize`] turns a subtree
//! into the byte form XML-DSig digests.

mod c14n;
mod dom;

pub use c14n::{canonicalize, CanonicalizationMethod};
pub use dom::{Attribute, Document, Element, Namespace, Node, ParseOptions, XML_NS};
