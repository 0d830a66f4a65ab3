pub mod carts;
pub mod db;
pub mod discounts;
pub mod inventory;
pub mod locks;
pub mod models;
pub mod money;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod taxes;
pub mod validation;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use carts::{
    CartItemsRepository, CartService, CartsRepository, ProductsRepository,
};
use discounts::{CouponsRepository, DiscountEngine};
use locks::MutationLocks;
use models::Address;
use orders::{OrderService, OrdersRepository};
use payments::{UnconfiguredGateway, UnconfiguredQuoteProvider};
use shipping::{ShippingRepository, ShippingService};
use taxes::{TaxRatesRepository, TaxResolver};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        carts::handlers::create_cart_handler,
        carts::handlers::get_cart_handler,
        carts::handlers::add_item_handler,
        carts::handlers::update_item_handler,
        carts::handlers::remove_item_handler,
        carts::handlers::apply_coupon_handler,
        carts::handlers::remove_coupon_handler,
        carts::handlers::set_destination_handler,
        carts::handlers::recompute_cart_handler,
        carts::handlers::merge_carts_handler,
        carts::handlers::checkout_handler,
        orders::handlers::get_order_handler,
        orders::handlers::transition_order_handler,
        orders::handlers::refund_order_handler,
    ),
    components(
        schemas(
            models::Address,
            money::Money,
            carts::CartResponse,
            carts::CartLineItem,
            carts::CartTotals,
            carts::CartStatus,
            carts::CartOwner,
            carts::LineAddon,
            carts::CreateCartRequest,
            carts::AddItemRequest,
            carts::UpdateItemRequest,
            carts::ApplyCouponRequest,
            carts::SetDestinationRequest,
            carts::CheckoutRequest,
            carts::MergeCartRequest,
            discounts::AppliedDiscount,
            orders::OrderResponse,
            orders::OrderItem,
            orders::LineSnapshot,
            orders::OrderStatus,
            orders::PaymentStatus,
            orders::FulfillmentStatus,
            orders::TransitionRequest,
            orders::RefundRequest,
            orders::RefundLine,
        )
    ),
    tags(
        (name = "carts", description = "Cart pricing and recomputation endpoints"),
        (name = "orders", description = "Order lifecycle endpoints")
    ),
    info(
        title = "Storefront Pricing & Fulfillment API",
        version = "1.0.0",
        description = "Order pricing and fulfillment computation engine: cart totals, taxes, shipping rates, discounts, and the order status machine"
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub cart_service: CartService<UnconfiguredQuoteProvider>,
    pub order_service: OrderService<UnconfiguredGateway>,
}

impl AppState {
    /// Wire repositories, engines and services onto one pool
    pub fn new(db: PgPool, origin: Address) -> Self {
        let carts_repo = CartsRepository::new(db.clone());
        let items_repo = CartItemsRepository::new(db.clone());
        let products_repo = ProductsRepository::new(db.clone());
        let discount_engine = DiscountEngine::new(CouponsRepository::new(db.clone()));
        let tax_resolver = TaxResolver::new(TaxRatesRepository::new(db.clone()));
        let shipping = ShippingService::new(
            ShippingRepository::new(db.clone()),
            UnconfiguredQuoteProvider,
            origin,
        );
        let locks = MutationLocks::new();

        let cart_service = CartService::new(
            carts_repo.clone(),
            items_repo.clone(),
            products_repo.clone(),
            discount_engine.clone(),
            tax_resolver,
            shipping,
            locks.clone(),
        );
        let order_service = OrderService::new(
            db.clone(),
            OrdersRepository::new(db.clone()),
            carts_repo,
            items_repo,
            products_repo,
            discount_engine,
            UnconfiguredGateway,
            locks,
        );

        Self {
            db,
            cart_service,
            order_service,
        }
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS middleware
pub fn create_router(state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Pricing API
        .route("/api/carts", post(carts::create_cart_handler))
        .route("/api/carts/merge", post(carts::merge_carts_handler))
        .route("/api/carts/:cart_id", get(carts::get_cart_handler))
        .route("/api/carts/:cart_id/items", post(carts::add_item_handler))
        .route(
            "/api/carts/:cart_id/items/:item_id",
            patch(carts::update_item_handler),
        )
        .route(
            "/api/carts/:cart_id/items/:item_id",
            delete(carts::remove_item_handler),
        )
        .route(
            "/api/carts/:cart_id/coupons",
            post(carts::apply_coupon_handler),
        )
        .route(
            "/api/carts/:cart_id/coupons/:code",
            delete(carts::remove_coupon_handler),
        )
        .route(
            "/api/carts/:cart_id/destination",
            put(carts::set_destination_handler),
        )
        .route(
            "/api/carts/:cart_id/recompute",
            post(carts::recompute_cart_handler),
        )
        .route("/api/carts/:cart_id/checkout", post(carts::checkout_handler))
        // Order API
        .route("/api/orders/:order_id", get(orders::get_order_handler))
        .route(
            "/api/orders/:order_id/transition",
            post(orders::transition_order_handler),
        )
        .route(
            "/api/orders/:order_id/refund",
            post(orders::refund_order_handler),
        )
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Storefront pricing engine - Starting...");

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    // Warehouse origin for externally-calculated shipping quotes
    let origin_country =
        std::env::var("SHIP_ORIGIN_COUNTRY").unwrap_or_else(|_| "US".to_string());

    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    let state = AppState::new(db_pool, Address::new(&origin_country));
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Pricing engine is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await.expect("Server error");
}
