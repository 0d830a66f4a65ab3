use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::carts::error::CartError;
use crate::carts::models::{
    AddItemRequest, Cart, CartLineItem, CartOwner, CartResponse, CartStatus, CreateCartRequest,
    MergeCartRequest,
};
use crate::carts::repository::{CartItemsRepository, CartsRepository, ProductsRepository};
use crate::carts::totals;
use crate::discounts::{self, AppliedDiscount, DiscountEngine};
use crate::locks::MutationLocks;
use crate::models::Address;
use crate::money::Money;
use crate::payments::RateQuoteProvider;
use crate::shipping::{ShipmentContext, ShippingService};
use crate::taxes::{RateFilter, TaxResolver};

/// Guest carts expire after this long without checkout
const GUEST_CART_TTL_DAYS: i64 = 30;

/// Bounded retries for the optimistic totals write
const TOTALS_WRITE_ATTEMPTS: u32 = 3;

/// Service for cart business logic
///
/// Owns the recompute-after-every-mutation discipline: each public mutation
/// takes the cart's mutation lock, applies its change, and re-derives the
/// cached totals before returning. Concurrent out-of-process writers are
/// caught by the version-guarded totals write and retried.
#[derive(Clone)]
pub struct CartService<Q> {
    carts_repo: CartsRepository,
    items_repo: CartItemsRepository,
    products_repo: ProductsRepository,
    discount_engine: DiscountEngine,
    tax_resolver: TaxResolver,
    shipping: ShippingService<Q>,
    locks: MutationLocks,
}

impl<Q: RateQuoteProvider + Clone> CartService<Q> {
    /// Create a new CartService
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        carts_repo: CartsRepository,
        items_repo: CartItemsRepository,
        products_repo: ProductsRepository,
        discount_engine: DiscountEngine,
        tax_resolver: TaxResolver,
        shipping: ShippingService<Q>,
        locks: MutationLocks,
    ) -> Self {
        Self {
            carts_repo,
            items_repo,
            products_repo,
            discount_engine,
            tax_resolver,
            shipping,
            locks,
        }
    }

    /// Create a cart for a user or a guest session
    ///
    /// # Validation
    /// - Exactly one of `user_id` and `session_token` must be set
    /// - Guest carts receive an expiry; user carts do not
    pub async fn create_cart(&self, request: CreateCartRequest) -> Result<CartResponse, CartError> {
        let owner = CartOwner::from_columns(request.user_id, request.session_token)?;
        let expires_at = match owner {
            CartOwner::Guest(_) => Some(Utc::now() + Duration::days(GUEST_CART_TTL_DAYS)),
            CartOwner::User(_) => None,
        };

        let cart = self
            .carts_repo
            .create(&owner, &request.currency.to_uppercase(), expires_at)
            .await?;
        tracing::debug!("Created cart {} for {:?}", cart.id, owner);

        self.build_response(cart, vec![], vec![])
    }

    /// Fetch a cart with items, discounts and totals
    ///
    /// Verifies the stored totals identity on the way out; a mismatch means
    /// some write path skipped recomputation and is surfaced as an invariant
    /// violation rather than patched over.
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartResponse, CartError> {
        let cart = self
            .carts_repo
            .find_by_id(cart_id)
            .await?
            .ok_or(CartError::NotFound)?;
        totals::verify_identity(&cart.totals()?)?;

        let items = self.items_repo.find_by_cart_id(cart.id).await?;
        let currency = cart.currency()?;
        let subtotal = totals::subtotal(&items, currency)?;
        let codes = self.carts_repo.list_coupon_codes(cart.id).await?;
        let priced = self
            .discount_engine
            .price_applied_coupons(&codes, subtotal)
            .await?;

        self.build_response(cart, items, priced)
    }

    /// Add an item to a cart
    ///
    /// An existing line with the same product+variant has its quantity
    /// incremented instead of a duplicate row being created. The unit price
    /// and weight are snapshotted from the catalog at add time.
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        request: AddItemRequest,
    ) -> Result<CartResponse, CartError> {
        if request.quantity < 1 {
            return Err(CartError::InvalidQuantity(format!(
                "Quantity must be at least 1, got {}",
                request.quantity
            )));
        }

        let _guard = self.locks.acquire(cart_id).await;
        let cart = self.load_open_cart(cart_id).await?;
        let currency = cart.currency()?;

        let product = self
            .products_repo
            .find_by_id(request.product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(CartError::ProductNotFound(request.product_id))?;
        if !product.currency.eq_ignore_ascii_case(&cart.currency) {
            return Err(CartError::ValidationError(format!(
                "Product {} is priced in {}, cart is {}",
                product.id, product.currency, cart.currency
            )));
        }

        let (unit_price, weight_grams) = match request.variant_id {
            Some(variant_id) => {
                let variant = self
                    .products_repo
                    .find_variant(product.id, variant_id)
                    .await?
                    .filter(|v| v.is_active)
                    .ok_or(CartError::VariantNotFound(variant_id))?;
                (
                    variant
                        .effective_price(&product)
                        .map_err(CartError::ValidationError)?,
                    variant.effective_weight(&product),
                )
            }
            None => (
                product.unit_price().map_err(CartError::ValidationError)?,
                product.weight_grams,
            ),
        };
        debug_assert_eq!(unit_price.currency(), currency);

        match self
            .items_repo
            .find_by_product(cart.id, request.product_id, request.variant_id)
            .await?
        {
            Some(existing) => {
                self.items_repo
                    .increment_quantity(existing.id, request.quantity)
                    .await?;
            }
            None => {
                self.items_repo
                    .insert(
                        cart.id,
                        request.product_id,
                        request.variant_id,
                        request.quantity,
                        unit_price.amount_minor(),
                        weight_grams,
                        &request.addons,
                    )
                    .await?;
            }
        }

        self.recompute_locked(cart.id).await
    }

    /// Change a line's quantity; zero or less removes the line
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: i32,
        quantity: i32,
    ) -> Result<CartResponse, CartError> {
        let _guard = self.locks.acquire(cart_id).await;
        let cart = self.load_open_cart(cart_id).await?;

        let item = self
            .items_repo
            .find_by_id(cart.id, item_id)
            .await?
            .ok_or(CartError::ItemNotFound(item_id))?;

        if quantity <= 0 {
            self.items_repo.delete(item.id).await?;
        } else {
            self.items_repo.set_quantity(item.id, quantity).await?;
        }

        self.recompute_locked(cart.id).await
    }

    /// Remove a line from a cart
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        item_id: i32,
    ) -> Result<CartResponse, CartError> {
        let _guard = self.locks.acquire(cart_id).await;
        let cart = self.load_open_cart(cart_id).await?;

        let item = self
            .items_repo
            .find_by_id(cart.id, item_id)
            .await?
            .ok_or(CartError::ItemNotFound(item_id))?;
        self.items_repo.delete(item.id).await?;

        self.recompute_locked(cart.id).await
    }

    /// Apply a coupon code to a cart
    pub async fn apply_coupon(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CartResponse, CartError> {
        let _guard = self.locks.acquire(cart_id).await;
        let cart = self.load_open_cart(cart_id).await?;
        let currency = cart.currency()?;

        let items = self.items_repo.find_by_cart_id(cart.id).await?;
        let subtotal = totals::subtotal(&items, currency)?;
        let applied = self.carts_repo.list_coupon_codes(cart.id).await?;

        let coupon = self
            .discount_engine
            .resolve_coupon(code, subtotal, &applied)
            .await?;
        self.carts_repo.add_coupon_code(cart.id, &coupon.code).await?;
        tracing::info!("Applied coupon {} to cart {}", coupon.code, cart.id);

        self.recompute_locked(cart.id).await
    }

    /// Remove a coupon code from a cart
    pub async fn remove_coupon(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CartResponse, CartError> {
        let _guard = self.locks.acquire(cart_id).await;
        let cart = self.load_open_cart(cart_id).await?;

        let removed = self.carts_repo.remove_coupon_code(cart.id, code).await?;
        if !removed {
            return Err(CartError::Discount(
                crate::discounts::DiscountError::InvalidCoupon(code.to_string()),
            ));
        }

        self.recompute_locked(cart.id).await
    }

    /// Set the destination stub used for tax and shipping estimation
    pub async fn set_destination(
        &self,
        cart_id: Uuid,
        address: &Address,
    ) -> Result<CartResponse, CartError> {
        let _guard = self.locks.acquire(cart_id).await;
        let cart = self.load_open_cart(cart_id).await?;

        self.carts_repo.set_destination(cart.id, address).await?;
        self.recompute_locked(cart.id).await
    }

    /// Recompute a cart's totals explicitly
    ///
    /// Idempotent: with no intervening mutation, recomputing twice produces
    /// identical totals.
    pub async fn recompute(&self, cart_id: Uuid) -> Result<CartResponse, CartError> {
        let _guard = self.locks.acquire(cart_id).await;
        self.load_open_cart(cart_id).await?;
        self.recompute_locked(cart_id).await
    }

    /// Merge a guest cart into the user's cart on login
    ///
    /// Line items are unioned by product+variant with quantities summed; the
    /// guest cart is discarded afterwards. The user gets a fresh cart when
    /// they had none.
    pub async fn merge_guest_cart(
        &self,
        request: MergeCartRequest,
    ) -> Result<CartResponse, CartError> {
        let guest = self
            .carts_repo
            .find_active_by_session(&request.session_token)
            .await?
            .ok_or(CartError::NotFound)?;
        if guest.is_expired(Utc::now()) {
            return Err(CartError::Expired);
        }

        let target = match self.carts_repo.find_active_by_user(request.user_id).await? {
            Some(cart) => cart,
            None => {
                self.carts_repo
                    .create(&CartOwner::User(request.user_id), &guest.currency, None)
                    .await?
            }
        };
        if !target.currency.eq_ignore_ascii_case(&guest.currency) {
            return Err(CartError::ValidationError(format!(
                "Cannot merge {} cart into {} cart",
                guest.currency, target.currency
            )));
        }

        // Lock both carts in a fixed order so two concurrent merges cannot
        // deadlock against each other
        let (first, second) = if guest.id < target.id {
            (guest.id, target.id)
        } else {
            (target.id, guest.id)
        };
        let _guard_a = self.locks.acquire(first).await;
        let _guard_b = self.locks.acquire(second).await;

        let guest_items = self.items_repo.find_by_cart_id(guest.id).await?;
        for item in &guest_items {
            match self
                .items_repo
                .find_by_product(target.id, item.product_id, item.variant_id)
                .await?
            {
                Some(existing) => {
                    self.items_repo
                        .increment_quantity(existing.id, item.quantity)
                        .await?;
                }
                None => {
                    self.items_repo
                        .insert(
                            target.id,
                            item.product_id,
                            item.variant_id,
                            item.quantity,
                            item.unit_price_minor,
                            item.weight_grams,
                            &item.addons.0,
                        )
                        .await?;
                }
            }
        }

        self.carts_repo.delete(guest.id).await?;
        tracing::info!(
            "Merged guest cart {} into user cart {} ({} lines)",
            guest.id,
            target.id,
            guest_items.len()
        );

        self.recompute_locked(target.id).await
    }

    /// Load a cart that is still open for mutation
    ///
    /// Expired guest carts are moved to the expired status and excluded from
    /// recomputation and checkout.
    async fn load_open_cart(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        let cart = self
            .carts_repo
            .find_by_id(cart_id)
            .await?
            .ok_or(CartError::NotFound)?;

        if cart.is_expired(Utc::now()) {
            if cart.status == CartStatus::Active {
                self.carts_repo
                    .set_status(cart.id, CartStatus::Expired)
                    .await?;
            }
            return Err(CartError::Expired);
        }
        if cart.status != CartStatus::Active {
            return Err(CartError::NotOpen(format!(
                "Cart is {}, not active",
                cart.status
            )));
        }
        Ok(cart)
    }

    /// Re-derive and persist the cached totals; caller holds the cart lock
    ///
    /// The fixed pipeline: line items → subtotal; coupons against the
    /// subtotal → discount; tax on (subtotal − discount); shipping on the
    /// post-discount subtotal and current weights/quantities; then
    /// `total = subtotal − discount + tax + shipping`. A version conflict on
    /// the write (an out-of-process writer) re-reads and recomputes, a
    /// bounded number of times.
    async fn recompute_locked(&self, cart_id: Uuid) -> Result<CartResponse, CartError> {
        for attempt in 0..TOTALS_WRITE_ATTEMPTS {
            let cart = self
                .carts_repo
                .find_by_id(cart_id)
                .await?
                .ok_or(CartError::NotFound)?;
            let currency = cart.currency()?;

            let (items, all_digital) = self.refreshed_items(&cart).await?;

            let subtotal = totals::subtotal(&items, currency)?;
            let codes = self.carts_repo.list_coupon_codes(cart.id).await?;
            let priced = self
                .discount_engine
                .price_applied_coupons(&codes, subtotal)
                .await?;
            let discount = discounts::total_discount(&priced, subtotal)?
                .clamp_at_most(&subtotal)?;
            let taxable = subtotal.sub(&discount)?;

            let tax = match cart.destination() {
                Some(address) => {
                    let filter = RateFilter {
                        is_shipping: false,
                        is_digital: all_digital,
                        tax_class: None,
                        category_id: None,
                    };
                    self.tax_resolver
                        .calculate_tax(taxable, &address, &filter)
                        .await?
                        .total
                }
                None => Money::zero(currency),
            };

            let shipping = match cart.destination() {
                Some(address) if !items.is_empty() && !all_digital => {
                    let ctx = ShipmentContext {
                        subtotal: taxable,
                        total_weight_grams: totals::total_weight_grams(&items),
                        total_quantity: totals::total_quantity(&items),
                        destination: address,
                    };
                    self.shipping
                        .cheapest_quote(&ctx)
                        .await?
                        .map(|q| q.cost)
                        .unwrap_or(Money::zero(currency))
                }
                _ => Money::zero(currency),
            };

            let new_totals = totals::assemble(subtotal, discount, tax, shipping)?;
            match self
                .carts_repo
                .update_totals(cart.id, &new_totals, cart.version)
                .await?
            {
                Some(saved) => return self.build_response(saved, items, priced),
                None => {
                    tracing::warn!(
                        "Cart {} totals write lost version race (attempt {})",
                        cart.id,
                        attempt + 1
                    );
                }
            }
        }
        Err(CartError::ConcurrentModification)
    }

    /// Reload lines, refreshing cart-stage price/weight snapshots from the
    /// catalog; returns the lines plus whether every line is a digital good
    async fn refreshed_items(&self, cart: &Cart) -> Result<(Vec<CartLineItem>, bool), CartError> {
        let currency = cart.currency()?;
        let mut items = self.items_repo.find_by_cart_id(cart.id).await?;
        let mut all_digital = !items.is_empty();

        for item in &mut items {
            // A product withdrawn from the catalog keeps its snapshot; the
            // line stays priced as added
            let Some(product) = self.products_repo.find_by_id(item.product_id).await? else {
                all_digital = false;
                continue;
            };
            if !product.is_digital {
                all_digital = false;
            }

            let (price, weight) = match item.variant_id {
                Some(variant_id) => {
                    match self.products_repo.find_variant(product.id, variant_id).await? {
                        Some(variant) => (
                            variant
                                .effective_price(&product)
                                .map_err(CartError::ValidationError)?,
                            variant.effective_weight(&product),
                        ),
                        None => continue,
                    }
                }
                None => (
                    product.unit_price().map_err(CartError::ValidationError)?,
                    product.weight_grams,
                ),
            };

            if price.currency() == currency
                && (price.amount_minor() != item.unit_price_minor
                    || weight != item.weight_grams)
            {
                self.items_repo
                    .refresh_snapshot(item.id, price.amount_minor(), weight)
                    .await?;
                item.unit_price_minor = price.amount_minor();
                item.weight_grams = weight;
            }
        }

        Ok((items, all_digital))
    }

    fn build_response(
        &self,
        cart: Cart,
        items: Vec<CartLineItem>,
        applied_discounts: Vec<AppliedDiscount>,
    ) -> Result<CartResponse, CartError> {
        Ok(CartResponse {
            id: cart.id,
            owner: cart.owner()?,
            status: cart.status,
            currency: cart.currency.clone(),
            destination: cart.destination(),
            items,
            applied_discounts,
            totals: cart.totals()?,
            expires_at: cart.expires_at,
            updated_at: cart.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    // CartService orchestrates repositories and the pricing engines; its
    // end-to-end behavior (add/merge/recompute against Postgres) belongs to
    // the integration suite. The pieces with interesting logic are covered
    // where they live: totals.rs (pipeline identity, idempotence), the
    // discount engine (stacking), the tax resolver (compound ordering), the
    // shipping calculator (tiers, thresholds), and locks.rs (interleaved
    // mutations cannot drop an update).
}
