// HTTP handlers for the pricing API
//
// The cart endpoints are the engine's exposed pricing surface:
// recomputation, coupons, destination, and checkout. Identity (which user
// may touch which cart) is enforced by the storefront in front of this
// service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::carts::{
    AddItemRequest, ApplyCouponRequest, CartError, CartResponse, CheckoutRequest,
    CreateCartRequest, MergeCartRequest, SetDestinationRequest, UpdateItemRequest,
};
use crate::orders::{OrderError, OrderResponse};

/// Handler for POST /api/carts
/// Creates a cart for a user or guest session
#[utoipa::path(
    post,
    path = "/api/carts",
    request_body = CreateCartRequest,
    responses(
        (status = 201, description = "Cart created", body = CartResponse),
        (status = 400, description = "Invalid owner or currency")
    ),
    tag = "carts"
)]
pub async fn create_cart_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateCartRequest>,
) -> Result<(StatusCode, Json<CartResponse>), CartError> {
    request
        .validate()
        .map_err(|e| CartError::ValidationError(e.to_string()))?;

    let cart = state.cart_service.create_cart(request).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

/// Handler for GET /api/carts/{cart_id}
#[utoipa::path(
    get,
    path = "/api/carts/{cart_id}",
    responses(
        (status = 200, description = "Cart with items and totals", body = CartResponse),
        (status = 404, description = "Cart not found")
    ),
    tag = "carts"
)]
pub async fn get_cart_handler(
    State(state): State<crate::AppState>,
    Path(cart_id): Path<Uuid>,
) -> Result<Json<CartResponse>, CartError> {
    let cart = state.cart_service.get_cart(cart_id).await?;
    Ok(Json(cart))
}

/// Handler for POST /api/carts/{cart_id}/items
/// Adds an item; an existing product+variant line has its quantity bumped
#[utoipa::path(
    post,
    path = "/api/carts/{cart_id}/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Cart recomputed with the new line", body = CartResponse),
        (status = 400, description = "Unknown product or invalid quantity"),
        (status = 410, description = "Cart has expired")
    ),
    tag = "carts"
)]
pub async fn add_item_handler(
    State(state): State<crate::AppState>,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, CartError> {
    request
        .validate()
        .map_err(|e| CartError::ValidationError(e.to_string()))?;

    let cart = state.cart_service.add_item(cart_id, request).await?;
    Ok(Json(cart))
}

/// Handler for PATCH /api/carts/{cart_id}/items/{item_id}
/// Updates a line's quantity; zero or less removes the line
#[utoipa::path(
    patch,
    path = "/api/carts/{cart_id}/items/{item_id}",
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Cart recomputed", body = CartResponse),
        (status = 404, description = "Cart or line not found")
    ),
    tag = "carts"
)]
pub async fn update_item_handler(
    State(state): State<crate::AppState>,
    Path((cart_id, item_id)): Path<(Uuid, i32)>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, CartError> {
    let cart = state
        .cart_service
        .update_item_quantity(cart_id, item_id, request.quantity)
        .await?;
    Ok(Json(cart))
}

/// Handler for DELETE /api/carts/{cart_id}/items/{item_id}
#[utoipa::path(
    delete,
    path = "/api/carts/{cart_id}/items/{item_id}",
    responses(
        (status = 200, description = "Cart recomputed without the line", body = CartResponse),
        (status = 404, description = "Cart or line not found")
    ),
    tag = "carts"
)]
pub async fn remove_item_handler(
    State(state): State<crate::AppState>,
    Path((cart_id, item_id)): Path<(Uuid, i32)>,
) -> Result<Json<CartResponse>, CartError> {
    let cart = state.cart_service.remove_item(cart_id, item_id).await?;
    Ok(Json(cart))
}

/// Handler for POST /api/carts/{cart_id}/coupons
#[utoipa::path(
    post,
    path = "/api/carts/{cart_id}/coupons",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied and cart recomputed", body = CartResponse),
        (status = 400, description = "Invalid coupon or below minimum"),
        (status = 409, description = "Coupon already applied")
    ),
    tag = "carts"
)]
pub async fn apply_coupon_handler(
    State(state): State<crate::AppState>,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<CartResponse>, CartError> {
    request
        .validate()
        .map_err(|e| CartError::ValidationError(e.to_string()))?;

    let cart = state
        .cart_service
        .apply_coupon(cart_id, &request.code)
        .await?;
    Ok(Json(cart))
}

/// Handler for DELETE /api/carts/{cart_id}/coupons/{code}
#[utoipa::path(
    delete,
    path = "/api/carts/{cart_id}/coupons/{code}",
    responses(
        (status = 200, description = "Coupon removed and cart recomputed", body = CartResponse),
        (status = 400, description = "Coupon not applied to this cart")
    ),
    tag = "carts"
)]
pub async fn remove_coupon_handler(
    State(state): State<crate::AppState>,
    Path((cart_id, code)): Path<(Uuid, String)>,
) -> Result<Json<CartResponse>, CartError> {
    let cart = state.cart_service.remove_coupon(cart_id, &code).await?;
    Ok(Json(cart))
}

/// Handler for PUT /api/carts/{cart_id}/destination
/// Sets the address stub used for tax and shipping estimation
#[utoipa::path(
    put,
    path = "/api/carts/{cart_id}/destination",
    request_body = SetDestinationRequest,
    responses(
        (status = 200, description = "Destination set and cart recomputed", body = CartResponse),
        (status = 400, description = "Malformed address")
    ),
    tag = "carts"
)]
pub async fn set_destination_handler(
    State(state): State<crate::AppState>,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<SetDestinationRequest>,
) -> Result<Json<CartResponse>, CartError> {
    request
        .validate()
        .map_err(|e| CartError::ValidationError(e.to_string()))?;

    let cart = state
        .cart_service
        .set_destination(cart_id, &request.address)
        .await?;
    Ok(Json(cart))
}

/// Handler for POST /api/carts/{cart_id}/recompute
/// Explicit recomputation; idempotent when nothing changed
#[utoipa::path(
    post,
    path = "/api/carts/{cart_id}/recompute",
    responses(
        (status = 200, description = "Recomputed cart", body = CartResponse),
        (status = 410, description = "Cart has expired")
    ),
    tag = "carts"
)]
pub async fn recompute_cart_handler(
    State(state): State<crate::AppState>,
    Path(cart_id): Path<Uuid>,
) -> Result<Json<CartResponse>, CartError> {
    let cart = state.cart_service.recompute(cart_id).await?;
    Ok(Json(cart))
}

/// Handler for POST /api/carts/merge
/// Merges a guest cart into the user's cart on login
#[utoipa::path(
    post,
    path = "/api/carts/merge",
    request_body = MergeCartRequest,
    responses(
        (status = 200, description = "Merged cart", body = CartResponse),
        (status = 404, description = "Guest cart not found")
    ),
    tag = "carts"
)]
pub async fn merge_carts_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<MergeCartRequest>,
) -> Result<Json<CartResponse>, CartError> {
    request
        .validate()
        .map_err(|e| CartError::ValidationError(e.to_string()))?;

    let cart = state.cart_service.merge_guest_cart(request).await?;
    Ok(Json(cart))
}

/// Handler for POST /api/carts/{cart_id}/checkout
/// Prices the cart against the final address, then converts it to an order
#[utoipa::path(
    post,
    path = "/api/carts/{cart_id}/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Empty cart or malformed address"),
        (status = 409, description = "Insufficient stock"),
        (status = 410, description = "Cart has expired")
    ),
    tag = "carts"
)]
pub async fn checkout_handler(
    State(state): State<crate::AppState>,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), OrderError> {
    request
        .validate()
        .map_err(|e| OrderError::ValidationError(e.to_string()))?;

    // Final address in, totals recomputed against it, then the snapshot
    state
        .cart_service
        .set_destination(cart_id, &request.address)
        .await
        .map_err(OrderError::Cart)?;

    let order = state.order_service.checkout(cart_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
