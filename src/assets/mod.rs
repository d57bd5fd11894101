/// Image and base64 decoding.
pub mod decode;
/// Font loading and Parley text layout.
pub mod text;
