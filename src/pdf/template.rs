//! Overlaying text onto the first page of an uploaded background PDF.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::canvas::Canvas;
use super::fonts::ALL_FACES;
use crate::error::RenderError;

pub struct LoadedTemplate {
    doc: Document,
    page_id: ObjectId,
    pub width: f32,
    pub height: f32,
}

impl LoadedTemplate {
    pub fn load(bytes: &[u8]) -> Result<Self, RenderError> {
        let doc = Document::load_mem(bytes).map_err(RenderError::Template)?;
        let page_id = *doc
            .get_pages()
            .values()
            .next()
            .ok_or(RenderError::EmptyTemplate)?;
        let (width, height) = page_size(&doc, page_id)?;

        Ok(Self {
            doc,
            page_id,
            width,
            height,
        })
    }

    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// Append the canvas on top of the existing page content and serialize.
    pub fn finish(mut self, canvas: Canvas) -> Result<Vec<u8>, RenderError> {
        let overlay = canvas.into_content()?;
        let page_id = self.page_id;

        let resources = self.merged_resources()?;
        let existing = self.existing_contents()?;

        // Isolate the background's graphics state from the overlay.
        let save_id = self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let mut restore_and_draw = b"\nQ\n".to_vec();
        restore_and_draw.extend_from_slice(&overlay);
        let overlay_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), restore_and_draw));

        let mut contents = vec![Object::Reference(save_id)];
        contents.extend(existing);
        contents.push(Object::Reference(overlay_id));

        let page = self
            .doc
            .get_dictionary_mut(page_id)
            .map_err(RenderError::Assemble)?;
        page.set("Contents", Object::Array(contents));
        page.set("Resources", Object::Dictionary(resources));

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| RenderError::Save(e.to_string()))?;
        Ok(out)
    }

    /// The page's effective resources (own or inherited) with our fonts added.
    fn merged_resources(&mut self) -> Result<Dictionary, RenderError> {
        let mut resources = match inherited(&self.doc, self.page_id, b"Resources") {
            Some(obj) => resolve(&self.doc, obj)
                .as_dict()
                .cloned()
                .unwrap_or_else(|_| Dictionary::new()),
            None => Dictionary::new(),
        };

        let mut fonts = match resources.get(b"Font") {
            Ok(obj) => resolve(&self.doc, obj)
                .as_dict()
                .cloned()
                .unwrap_or_else(|_| Dictionary::new()),
            Err(_) => Dictionary::new(),
        };
        for face in ALL_FACES {
            let font_id = self.doc.add_object(face.dictionary());
            fonts.set(face.resource_name(), font_id);
        }
        resources.set("Font", fonts);

        Ok(resources)
    }

    fn existing_contents(&self) -> Result<Vec<Object>, RenderError> {
        let page = self
            .doc
            .get_dictionary(self.page_id)
            .map_err(RenderError::Assemble)?;

        Ok(match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                // An indirect array of streams is flattened into the new array.
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        })
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Look up a page attribute, walking up the `Parent` chain for inheritable
/// keys such as MediaBox and Resources.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Bounded to guard against cyclic Parent links in damaged files.
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn page_size(doc: &Document, page_id: ObjectId) -> Result<(f32, f32), RenderError> {
    let media_box = inherited(doc, page_id, b"MediaBox")
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .ok_or(RenderError::MissingMediaBox)?;

    let coords: Vec<f32> = media_box.iter().filter_map(|o| number(resolve(doc, o))).collect();
    if coords.len() != 4 {
        return Err(RenderError::MissingMediaBox);
    }

    let width = (coords[2] - coords[0]).abs();
    let height = (coords[3] - coords[1]).abs();
    if width <= 0.0 || height <= 0.0 {
        return Err(RenderError::MissingMediaBox);
    }
    Ok((width, height))
}
