//! Domain models for the server.
//!
//! These types represent validated domain objects separate from database row
//! types. Row types live next to the queries that produce them.

pub mod cart;
pub mod checkout;
pub mod product;
pub mod session;
pub mod token;
pub mod user;

pub use cart::{Cart, CartItem, CartLine, CartRow, DesiredCartItem, NewCartItem};
pub use checkout::{CheckoutRecord, NewCheckout, ProductSnapshot};
pub use product::{NewProduct, Product};
pub use session::{Principal, UserSnapshot};
pub use token::{NewToken, TokenRecord};
pub use user::User;
