//! Random operation sequences against the in-memory shop.
//!
//! A small model tracks shelf stock, cart lines and order statuses. After
//! every step the shop must agree with it: stock never goes negative, shelf
//! stock plus units held by live orders equals what was supplied, and cart
//! totals equal the sum of their lines.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::sample::Index;
use rust_decimal::Decimal;

use vic_shop_core::{Email, ErrorKind, OrderId, OrderStatus, Price, UserRole};
use vic_shop_integration_tests::{TestShop, address, start_time};
use vic_shop_storefront::db::{Store, UserRepository};
use vic_shop_storefront::models::{
    Cart, NewProduct, NewUser, OrderLine, Page, Principal, Product,
};

const PRODUCTS: usize = 3;
const CUSTOMERS: usize = 2;
const PRICES: [i64; PRODUCTS] = [550, 4500, 1299];

#[derive(Debug, Clone)]
enum Op {
    AddToCart {
        customer: usize,
        product: usize,
        quantity: i32,
    },
    SetCartLine {
        customer: usize,
        product: usize,
        quantity: i32,
    },
    RemoveCartLine {
        customer: usize,
        product: usize,
    },
    PlaceOrder {
        customer: usize,
        lines: BTreeMap<usize, i32>,
    },
    Checkout {
        customer: usize,
    },
    Cancel {
        order: Index,
    },
    ChangeStatus {
        order: Index,
        to: OrderStatus,
    },
    AdjustStock {
        product: usize,
        delta: i32,
    },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..CUSTOMERS, 0..PRODUCTS, 1..=4i32).prop_map(|(customer, product, quantity)| {
            Op::AddToCart { customer, product, quantity }
        }),
        2 => (0..CUSTOMERS, 0..PRODUCTS, 1..=6i32).prop_map(|(customer, product, quantity)| {
            Op::SetCartLine { customer, product, quantity }
        }),
        1 => (0..CUSTOMERS, 0..PRODUCTS)
            .prop_map(|(customer, product)| Op::RemoveCartLine { customer, product }),
        3 => (
            0..CUSTOMERS,
            prop::collection::btree_map(0..PRODUCTS, 1..=4i32, 1..=PRODUCTS),
        )
            .prop_map(|(customer, lines)| Op::PlaceOrder { customer, lines }),
        2 => (0..CUSTOMERS).prop_map(|customer| Op::Checkout { customer }),
        2 => any::<Index>().prop_map(|order| Op::Cancel { order }),
        2 => (any::<Index>(), prop::sample::select(OrderStatus::ALL.to_vec()))
            .prop_map(|(order, to)| Op::ChangeStatus { order, to }),
        2 => (0..PRODUCTS, -3..=3i32).prop_map(|(product, delta)| Op::AdjustStock { product, delta }),
    ]
}

struct World {
    shop: TestShop,
    admin: Principal,
    customers: Vec<Principal>,
    products: Vec<Product>,
}

struct PlacedOrder {
    id: OrderId,
    customer: usize,
    lines: BTreeMap<usize, i32>,
    status: OrderStatus,
}

struct Model {
    stock: Vec<i32>,
    /// Initial stock plus every accepted adjustment.
    supplied: Vec<i32>,
    carts: Vec<BTreeMap<usize, i32>>,
    orders: Vec<PlacedOrder>,
}

impl Model {
    fn fits(&self, lines: &BTreeMap<usize, i32>) -> bool {
        lines
            .iter()
            .all(|(&product, &quantity)| quantity <= self.stock[product])
    }

    fn take(&mut self, lines: &BTreeMap<usize, i32>) {
        for (&product, &quantity) in lines {
            self.stock[product] -= quantity;
        }
    }

    fn give_back(&mut self, lines: &BTreeMap<usize, i32>) {
        for (&product, &quantity) in lines {
            self.stock[product] += quantity;
        }
    }
}

/// Accounts go straight into the store; password hashing is not under test.
async fn seed_user(shop: &TestShop, email: &str, role: UserRole) -> Principal {
    let mut uow = shop.store.begin().await.unwrap();
    let user = uow
        .insert_user(NewUser {
            email: Email::parse(email).unwrap(),
            password_hash: "not-a-hash".to_owned(),
            first_name: "Sam".to_owned(),
            last_name: "Shopper".to_owned(),
            phone: None,
            role,
            email_verified: true,
            created_at: start_time(),
        })
        .await
        .unwrap();
    uow.commit().await.unwrap();
    user.principal()
}

async fn world(stock: &[i32]) -> World {
    let shop = TestShop::new();
    let admin = seed_user(&shop, "admin@vic.test", UserRole::Admin).await;
    let mut customers = Vec::with_capacity(CUSTOMERS);
    for index in 0..CUSTOMERS {
        let email = format!("customer{index}@vic.test");
        customers.push(seed_user(&shop, &email, UserRole::Customer).await);
    }

    let mut products = Vec::with_capacity(PRODUCTS);
    for (index, (&cents, &stock)) in PRICES.iter().zip(stock).enumerate() {
        let product = shop
            .catalog()
            .create(
                &admin,
                NewProduct {
                    name: format!("Product {index}"),
                    description: None,
                    price: Price::from_cents(cents).unwrap(),
                    stock_quantity: stock,
                    image_url: None,
                    category: None,
                    size: None,
                },
            )
            .await
            .unwrap();
        products.push(product);
    }

    World {
        shop,
        admin,
        customers,
        products,
    }
}

fn lines_for(world: &World, lines: &BTreeMap<usize, i32>) -> Vec<OrderLine> {
    lines
        .iter()
        .map(|(&product, &quantity)| OrderLine {
            product_id: world.products[product].id,
            quantity,
        })
        .collect()
}

async fn apply(world: &World, model: &mut Model, op: &Op) {
    match op {
        &Op::AddToCart {
            customer,
            product,
            quantity,
        } => {
            let result = world
                .shop
                .carts()
                .add_item(
                    world.customers[customer].user_id,
                    world.products[product].id,
                    quantity,
                )
                .await;
            let in_cart = model.carts[customer].get(&product).copied().unwrap_or(0);
            if in_cart + quantity <= model.stock[product] {
                check_cart_totals(world, &result.unwrap());
                model.carts[customer].insert(product, in_cart + quantity);
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientStock);
            }
        }
        &Op::SetCartLine {
            customer,
            product,
            quantity,
        } => {
            let user_id = world.customers[customer].user_id;
            let cart = world.shop.carts().get_cart(user_id).await.unwrap();
            let Some(item) = cart.item_for_product(world.products[product].id) else {
                assert!(!model.carts[customer].contains_key(&product));
                return;
            };
            let result = world
                .shop
                .carts()
                .update_item(user_id, item.id, quantity)
                .await;
            if quantity <= model.stock[product] {
                check_cart_totals(world, &result.unwrap());
                model.carts[customer].insert(product, quantity);
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientStock);
            }
        }
        &Op::RemoveCartLine { customer, product } => {
            let user_id = world.customers[customer].user_id;
            let cart = world.shop.carts().get_cart(user_id).await.unwrap();
            if let Some(item) = cart.item_for_product(world.products[product].id) {
                let cart = world
                    .shop
                    .carts()
                    .remove_item(user_id, item.id)
                    .await
                    .unwrap();
                check_cart_totals(world, &cart);
                model.carts[customer].remove(&product);
            }
        }
        Op::PlaceOrder { customer, lines } => {
            let result = world
                .shop
                .orders()
                .create_order(
                    world.customers[*customer].user_id,
                    &lines_for(world, lines),
                    &address(),
                )
                .await;
            if model.fits(lines) {
                let order = result.unwrap();
                model.take(lines);
                model.orders.push(PlacedOrder {
                    id: order.id,
                    customer: *customer,
                    lines: lines.clone(),
                    status: OrderStatus::Pending,
                });
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientStock);
            }
        }
        &Op::Checkout { customer } => {
            let result = world
                .shop
                .orders()
                .checkout(world.customers[customer].user_id, &address())
                .await;
            let lines = model.carts[customer].clone();
            if lines.is_empty() {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
            } else if model.fits(&lines) {
                let order = result.unwrap();
                model.take(&lines);
                model.carts[customer].clear();
                model.orders.push(PlacedOrder {
                    id: order.id,
                    customer,
                    lines,
                    status: OrderStatus::Pending,
                });
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientStock);
            }
        }
        Op::Cancel { order } => {
            if model.orders.is_empty() {
                return;
            }
            let index = order.index(model.orders.len());
            let placed = &model.orders[index];
            let owner = world.customers[placed.customer];
            let result = world.shop.orders().cancel_order(&owner, placed.id).await;
            if placed.status == OrderStatus::Pending {
                assert_eq!(result.unwrap().status, OrderStatus::Cancelled);
                let lines = placed.lines.clone();
                model.give_back(&lines);
                model.orders[index].status = OrderStatus::Cancelled;
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
            }
        }
        &Op::ChangeStatus { ref order, to } => {
            if model.orders.is_empty() {
                return;
            }
            let index = order.index(model.orders.len());
            let placed = &model.orders[index];
            let result = world
                .shop
                .orders()
                .update_status(&world.admin, placed.id, to)
                .await;
            if placed.status.can_transition_to(to) {
                assert_eq!(result.unwrap().status, to);
                if to == OrderStatus::Cancelled {
                    let lines = placed.lines.clone();
                    model.give_back(&lines);
                }
                model.orders[index].status = to;
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
            }
        }
        &Op::AdjustStock { product, delta } => {
            let result = world
                .shop
                .catalog()
                .adjust_stock(&world.admin, world.products[product].id, delta)
                .await;
            if model.stock[product] + delta >= 0 {
                assert_eq!(result.unwrap().stock_quantity, model.stock[product] + delta);
                model.stock[product] += delta;
                model.supplied[product] += delta;
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientStock);
            }
        }
    }
}

fn check_cart_totals(world: &World, cart: &Cart) {
    let mut subtotal = Decimal::ZERO;
    let mut units = 0_i64;
    for item in &cart.items {
        assert!(item.quantity >= 1);
        let product = world
            .products
            .iter()
            .find(|product| product.id == item.product_id)
            .unwrap();
        assert_eq!(item.unit_price, product.price);
        subtotal += item.unit_price.amount() * Decimal::from(item.quantity);
        units += i64::from(item.quantity);
    }
    assert_eq!(cart.subtotal(), subtotal);
    assert_eq!(cart.total_items(), units);
}

async fn check_invariants(world: &World, model: &Model) {
    let orders = world
        .shop
        .orders()
        .list_orders(&world.admin, None, Page::new(0, Page::MAX_SIZE))
        .await
        .unwrap();
    assert_eq!(orders.len(), model.orders.len());

    for (index, product) in world.products.iter().enumerate() {
        let stock = world.shop.stock_of(product).await;
        assert!(stock >= 0, "{} went negative: {stock}", product.name);
        assert_eq!(stock, model.stock[index]);

        let held: i32 = orders
            .iter()
            .filter(|order| order.status != OrderStatus::Cancelled)
            .flat_map(|order| &order.items)
            .filter(|item| item.product_id == product.id)
            .map(|item| item.quantity)
            .sum();
        assert_eq!(stock + held, model.supplied[index]);
    }

    for placed in &model.orders {
        let order = orders.iter().find(|order| order.id == placed.id).unwrap();
        assert_eq!(order.status, placed.status);
        let total: Decimal = order.items.iter().map(|item| item.subtotal).sum();
        assert_eq!(order.total_amount, total);
    }

    for (index, customer) in world.customers.iter().enumerate() {
        let cart = world.shop.carts().get_cart(customer.user_id).await.unwrap();
        check_cart_totals(world, &cart);
        let lines: BTreeMap<usize, i32> = cart
            .items
            .iter()
            .map(|item| {
                let product = world
                    .products
                    .iter()
                    .position(|product| product.id == item.product_id)
                    .unwrap();
                (product, item.quantity)
            })
            .collect();
        assert_eq!(lines, model.carts[index]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_shopping_keeps_stock_and_totals_consistent(
        stock in prop::collection::vec(0..=8i32, PRODUCTS),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let world = world(&stock).await;
            let mut model = Model {
                stock: stock.clone(),
                supplied: stock.clone(),
                carts: vec![BTreeMap::new(); CUSTOMERS],
                orders: Vec::new(),
            };

            check_invariants(&world, &model).await;
            for op in &ops {
                apply(&world, &mut model, op).await;
                check_invariants(&world, &model).await;
            }
        });
    }

    #[test]
    fn test_cancelling_a_fresh_order_restores_stock(
        stock in prop::collection::vec(0..=8i32, PRODUCTS),
        lines in prop::collection::btree_map(0..PRODUCTS, 1..=6i32, 1..=PRODUCTS),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let world = world(&stock).await;
            let customer = world.customers[0];
            let orders = world.shop.orders();

            let result = orders
                .create_order(customer.user_id, &lines_for(&world, &lines), &address())
                .await;
            let fits = lines.iter().all(|(&product, &quantity)| quantity <= stock[product]);
            if fits {
                let order = result.unwrap();
                for (&product, &quantity) in &lines {
                    assert_eq!(
                        world.shop.stock_of(&world.products[product]).await,
                        stock[product] - quantity
                    );
                }
                orders.cancel_order(&customer, order.id).await.unwrap();
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientStock);
            }

            for (index, product) in world.products.iter().enumerate() {
                assert_eq!(world.shop.stock_of(product).await, stock[index]);
            }
        });
    }
}
