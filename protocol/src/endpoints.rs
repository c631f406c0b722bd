//! Request/response types of the remote block-store API.
//!
//! Every endpoint is a POST of a bincode-encoded request body; the response
//! body is a bincode-encoded `Result<Response, String>`. Single blocks are
//! additionally addressable as `GET /content/<hex hash>`, outside of this
//! scheme, so plain HTTP clients can fetch them.

use {
    crate::{BlockHash, EncryptedPath, TreeItem},
    serde::{Deserialize, Serialize},
};

pub trait RequestToResponse {
    type Response;
    const PATH: &'static str;
}

macro_rules! response_type {
    ($request:ty, $response:ty) => {
        impl RequestToResponse for $request {
            type Response = $response;
            const PATH: &'static str = concat!("api/v1/", stringify!($request));
        }
    };
}

pub type Response<Request> = <Request as RequestToResponse>::Response;

/// Returns the full remote tree listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetTree;
response_type!(GetTree, Vec<TreeItem>);

/// Existence check for a batch of block hashes. The response carries one
/// flag per input hash, in input order.
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkHeadBlock(pub Vec<BlockHash>);
response_type!(BulkHeadBlock, Vec<bool>);

/// Uploads a batch of encrypted blocks. Idempotent: re-posting a block
/// that already exists is a no-op.
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkPostBlock(pub Vec<Vec<u8>>);
response_type!(BulkPostBlock, ());

/// Atomic tree mutation: removes `delete_paths`, then inserts `put_items`.
/// Either the whole mutation applies or none of it does; the response flag
/// reports whether it applied.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostTree {
    pub put_items: Vec<TreeItem>,
    pub delete_paths: Vec<EncryptedPath>,
}
response_type!(PostTree, bool);
