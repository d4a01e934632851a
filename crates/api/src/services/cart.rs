//! Cart service.
//!
//! Loads the stored cart, applies the stock rules from
//! [`kitshop_core::Cart`], writes back whatever changed and prices the
//! result with the configured [`PricingPolicy`].

use std::collections::HashMap;

use sqlx::PgPool;
use thiserror::Error;

use kitshop_core::{
    Cart, CartAdjustment, CartError, CartLine, PricingError, PricingPolicy, ProductId,
    QuantityChange, Size, UserId,
};

use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::models::{CartItemView, CartUpdate, CartView, Product};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error(transparent)]
    Cart(#[from] CartError),

    /// The product does not exist or is not for sale.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Cart operations for signed-in users and anonymous quotes.
pub struct CartService<'a> {
    products: ProductRepository<'a>,
    carts: CartRepository<'a>,
    pricing: &'a PricingPolicy,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, pricing: &'a PricingPolicy) -> Self {
        Self {
            products: ProductRepository::new(pool),
            carts: CartRepository::new(pool),
            pricing,
        }
    }

    /// The user's cart, reconciled against current stock.
    ///
    /// Adjustments made during reconciliation are persisted, so they are
    /// reported once.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` on database failure.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, CartServiceError> {
        let (cart, products, adjustments) = self.load(user_id).await?;
        Ok(price_cart(&cart, &products, adjustments, self.pricing)?)
    }

    /// Add units of a product in a size.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::ProductNotFound` for unknown or inactive
    /// products and `CartServiceError::Cart` when nothing more fits.
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: Size,
        quantity: u32,
    ) -> Result<CartUpdate, CartServiceError> {
        let (mut cart, products, adjustments) = self.load(user_id).await?;
        let product = self.sellable(product_id, &products).await?;

        let change = cart.add(product_id, size, quantity, product.stock)?;
        self.store_line(user_id, &cart, product_id, size).await?;

        let mut products = products;
        products.entry(product_id).or_insert(product);
        self.finish(&cart, &products, adjustments, change)
    }

    /// Set the quantity of an existing line, clamped to available stock.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Cart` if the line does not exist, the
    /// quantity is zero or the product sold out.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: Size,
        quantity: u32,
    ) -> Result<CartUpdate, CartServiceError> {
        let (mut cart, products, adjustments) = self.load(user_id).await?;
        let stock = products.get(&product_id).map_or(0, |p| p.stock);

        let change = cart.set_quantity(product_id, size, quantity, stock)?;
        self.store_line(user_id, &cart, product_id, size).await?;

        self.finish(&cart, &products, adjustments, change)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line does not exist.
    pub async fn remove(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: Size,
    ) -> Result<CartView, CartServiceError> {
        if !self.carts.delete_line(user_id, product_id, size).await? {
            return Err(CartError::LineNotFound { product_id, size }.into());
        }
        self.view(user_id).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` on database failure.
    pub async fn clear(&self, user_id: UserId) -> Result<CartView, CartServiceError> {
        self.carts.clear(user_id).await?;
        Ok(price_cart(&Cart::new(), &HashMap::new(), Vec::new(), self.pricing)?)
    }

    /// Price a cart held by the client, without storing it.
    ///
    /// Duplicate lines are merged, then the cart is reconciled like a
    /// stored one.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if a line has quantity zero.
    pub async fn quote(&self, lines: Vec<CartLine>) -> Result<CartView, CartServiceError> {
        let mut cart = Cart::from_lines(merge_lines(lines)?);
        let ids = product_ids(&cart);
        let products = self.products.get_many(&ids).await?;

        let adjustments = cart.reconcile(|id| products.get(&id).map(Product::availability));
        Ok(price_cart(&cart, &products, adjustments, self.pricing)?)
    }

    async fn load(
        &self,
        user_id: UserId,
    ) -> Result<(Cart, HashMap<ProductId, Product>, Vec<CartAdjustment>), CartServiceError> {
        let mut cart = Cart::from_lines(self.carts.lines(user_id).await?);
        let products = self.products.get_many(&product_ids(&cart)).await?;

        let adjustments = cart.reconcile(|id| products.get(&id).map(Product::availability));
        if !adjustments.is_empty() {
            tracing::info!(
                user_id = %user_id,
                adjustments = adjustments.len(),
                "cart reconciled against stock"
            );
            self.carts.replace(user_id, cart.lines()).await?;
        }

        Ok((cart, products, adjustments))
    }

    async fn sellable(
        &self,
        product_id: ProductId,
        loaded: &HashMap<ProductId, Product>,
    ) -> Result<Product, CartServiceError> {
        let product = match loaded.get(&product_id) {
            Some(p) => Some(p.clone()),
            None => self.products.get(product_id).await?,
        };
        product
            .filter(|p| p.active)
            .ok_or(CartServiceError::ProductNotFound(product_id))
    }

    async fn store_line(
        &self,
        user_id: UserId,
        cart: &Cart,
        product_id: ProductId,
        size: Size,
    ) -> Result<(), CartServiceError> {
        if let Some(line) = cart.line(product_id, size) {
            self.carts.upsert(user_id, line).await?;
        }
        Ok(())
    }

    fn finish(
        &self,
        cart: &Cart,
        products: &HashMap<ProductId, Product>,
        adjustments: Vec<CartAdjustment>,
        change: QuantityChange,
    ) -> Result<CartUpdate, CartServiceError> {
        Ok(CartUpdate {
            change,
            cart: price_cart(cart, products, adjustments, self.pricing)?,
        })
    }
}

fn product_ids(cart: &Cart) -> Vec<ProductId> {
    let mut ids: Vec<ProductId> = Vec::new();
    for line in cart.lines() {
        if !ids.contains(&line.product_id) {
            ids.push(line.product_id);
        }
    }
    ids
}

/// Merge lines that share `(product, size)`, keeping first-seen order.
fn merge_lines(lines: Vec<CartLine>) -> Result<Vec<CartLine>, CartError> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        match merged
            .iter_mut()
            .find(|m| m.product_id == line.product_id && m.size == line.size)
        {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(line),
        }
    }
    Ok(merged)
}

/// Price a reconciled cart. Every line's product must be in `products`.
fn price_cart(
    cart: &Cart,
    products: &HashMap<ProductId, Product>,
    adjustments: Vec<CartAdjustment>,
    pricing: &PricingPolicy,
) -> Result<CartView, PricingError> {
    let mut items = Vec::with_capacity(cart.lines().len());
    for line in cart.lines() {
        let Some(product) = products.get(&line.product_id) else {
            continue;
        };
        let line_total = product
            .price
            .checked_mul(line.quantity)
            .ok_or(kitshop_core::MoneyError::Overflow)?;
        items.push(CartItemView {
            product_id: line.product_id,
            name: product.name.clone(),
            size: line.size,
            unit_price: product.price,
            quantity: line.quantity,
            line_total,
            image_url: product.image_url.clone(),
            max_quantity: cart.available_for(line.product_id, line.size, product.stock),
        });
    }

    let totals = pricing.quote_online(items.iter().map(|i| (i.unit_price, i.quantity)))?;
    let item_count = items.iter().map(|i| i.quantity).sum();

    Ok(CartView {
        items,
        item_count,
        totals,
        adjustments,
    })
}
