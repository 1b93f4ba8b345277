pub mod error;
pub use error::Error;

pub mod parse;

/// Parsed configuration documents for a single processor model.
///
/// Documents borrow their text for `'input`; tags are located by name
/// anywhere within the registered documents, in registration order.
#[derive(Debug, Default)]
pub struct DocumentStorage<'input> {
    documents: Vec<xml::Document<'input>>,
}

impl<'input> DocumentStorage<'input> {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
        }
    }

    pub fn parse_document(&mut self, input: &'input str) -> Result<(), Error> {
        let document = xml::Document::parse(input)?;
        log::debug!(
            "registered configuration document with root `{}`",
            document.root_element().tag_name().name()
        );
        self.documents.push(document);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// First element named `name` across all documents.
    pub fn tag<'a>(&'a self, name: &'a str) -> Option<xml::Node<'a, 'input>> {
        self.tags(name).next()
    }

    pub fn tags<'a>(&'a self, name: &'a str) -> impl Iterator<Item = xml::Node<'a, 'input>> + 'a {
        self.documents
            .iter()
            .flat_map(|document| document.descendants())
            .filter(move |node| node.is_element() && node.tag_name().name() == name)
    }
}
