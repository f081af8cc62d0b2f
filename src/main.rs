//! rental - command-line client for the rental marketplace.
//!
//! Configuration comes from the environment (and a `.env` file); the logged-in user is kept
//! in a session file between runs.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rental_client::cache::CachedApi;
use rental_client::config::ClientConfig;
use rental_client::error::{AppError, Locale, Operation, Route};
use rental_client::flow::FlowError;
use rental_client::forms::{LoginForm, PaymentForm, RegistrationForm, ValidationError};
use rental_client::models::{Booking, Property, ProfileUpdate, PropertyType, SearchParams};
use rental_client::pricing::{parse_date, BookingQuote, PriceBreakdown};
use rental_client::session::{AuthSession, FileStore, SessionStore};
use rental_client::views::{
    BookingsView, ConfirmationView, PropertyDetailView, PropertyListView, ReviewView,
};
use rental_client::{HttpRentalApi, RentalApi};

#[derive(Parser)]
#[command(name = "rental")]
#[command(author, version, about = "Rental marketplace client", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price a stay without contacting the server (or for a listed property with --property)
    Quote {
        #[arg(long, value_parser = date_arg)]
        check_in: NaiveDate,
        #[arg(long, value_parser = date_arg)]
        check_out: NaiveDate,
        #[arg(long, default_value = "1")]
        guests: u32,
        /// Nightly rate, when not quoting a listed property
        #[arg(long, required_unless_present = "property")]
        price: Option<f64>,
        /// Guest limit, required alongside --price
        #[arg(long, required_unless_present = "property", conflicts_with = "property")]
        max_guests: Option<u32>,
        /// Quote this property's rate and guest limit
        #[arg(long)]
        property: Option<String>,
    },

    /// List properties
    Properties {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "")]
        keyword: String,
    },

    /// Show a property with its reviews
    Property { id: String },

    /// Search available properties
    Search {
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long, value_parser = date_arg)]
        check_in: Option<NaiveDate>,
        #[arg(long, value_parser = date_arg)]
        check_out: Option<NaiveDate>,
        #[arg(long)]
        guests: Option<u32>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        /// Apartment, House, "Unique space" or "Boutique hotel"
        #[arg(long, value_parser = property_type_arg)]
        property_type: Option<PropertyType>,
    },

    /// Log in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account and log in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Update the logged-in user's profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Book and pay a stay
    Book {
        property: String,
        #[arg(long, value_parser = date_arg)]
        check_in: NaiveDate,
        #[arg(long, value_parser = date_arg)]
        check_out: NaiveDate,
        #[arg(long, default_value = "1")]
        guests: u32,
        #[arg(long)]
        card_number: String,
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        cvc: String,
        #[arg(long)]
        card_name: String,
    },

    /// List your bookings
    Bookings,

    /// Show a booking confirmation
    Booking { id: String },

    /// Cancel a booking
    Cancel { id: String },

    /// Review a property
    Review {
        property: String,
        #[arg(long, default_value = "5")]
        rating: u8,
        #[arg(long)]
        comment: String,
    },
}

fn date_arg(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).map_err(|e| e.to_string())
}

fn property_type_arg(value: &str) -> Result<PropertyType, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown property type '{}'", value))
}

struct App {
    locale: Locale,
    session: AuthSession,
    api: CachedApi<HttpRentalApi>,
}

impl App {
    fn new(config: &ClientConfig) -> Result<Self> {
        let path = config.session_path();
        let store: Arc<dyn SessionStore> = Arc::new(
            FileStore::open(&path)
                .with_context(|| format!("opening session file {}", path.display()))?,
        );
        let http = HttpRentalApi::new(config, Arc::clone(&store))?;

        Ok(Self {
            locale: config.locale,
            session: AuthSession::restore(store),
            api: CachedApi::new(http, config.cache.clone()),
        })
    }

    // Turns a user-facing error into a printable one, pointing at login when needed
    fn explain(&self, err: AppError) -> anyhow::Error {
        match err.redirect() {
            Some(Route::Login) => anyhow!("{} (rental login)", err.user_message(self.locale)),
            _ => anyhow!(err.user_message(self.locale)),
        }
    }

    fn explain_flow(&self, err: FlowError) -> anyhow::Error {
        match err {
            FlowError::App(err) => self.explain(err),
            other => anyhow!(other.user_message(self.locale)),
        }
    }

    async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Quote {
                check_in,
                check_out,
                guests,
                price,
                max_guests,
                property,
            } => {
                let quote = match property {
                    Some(id) => {
                        let property = self
                            .api
                            .get_property(&id)
                            .await
                            .map_err(|e| self.explain(AppError::api(Operation::LoadProperty, e)))?;
                        BookingQuote::for_property(&property, check_in, check_out, guests)
                    }
                    None => BookingQuote::new(
                        check_in,
                        check_out,
                        guests,
                        price.unwrap_or_default(),
                        max_guests.unwrap_or_default(),
                    ),
                };
                self.quote(&quote)
            }
            Commands::Properties { page, keyword } => {
                let mut view = PropertyListView::new(self.locale);
                view.load(&self.api, page, &keyword).await;
                self.print_listing(&view)
            }
            Commands::Property { id } => {
                let mut view = PropertyDetailView::new(self.locale);
                view.load(&self.api, &id).await;
                self.print_detail(&view)
            }
            Commands::Search {
                keyword,
                city,
                check_in,
                check_out,
                guests,
                min_price,
                max_price,
                property_type,
            } => {
                let params = SearchParams {
                    keyword,
                    city,
                    check_in,
                    check_out,
                    guests,
                    min_price,
                    max_price,
                    property_type,
                    page_number: None,
                };
                let mut view = PropertyListView::new(self.locale);
                view.search(&self.api, &params).await;
                self.print_listing(&view)
            }
            Commands::Login { email, password } => {
                let user = self
                    .session
                    .login(&self.api, &LoginForm { email, password })
                    .await
                    .map_err(|e| self.explain(e))?;
                println!("Logged in as {} <{}>", user.name, user.email);
                Ok(())
            }
            Commands::Register {
                name,
                email,
                password,
                confirm_password,
            } => {
                let form = RegistrationForm {
                    name,
                    email,
                    password,
                    confirm_password,
                };
                let user = self
                    .session
                    .register(&self.api, &form)
                    .await
                    .map_err(|e| self.explain(e))?;
                println!("Registered and logged in as {} <{}>", user.name, user.email);
                Ok(())
            }
            Commands::Logout => {
                self.session.logout();
                println!("Logged out");
                Ok(())
            }
            Commands::Whoami => {
                match self.session.current_user() {
                    Some(user) if user.is_admin => {
                        println!("{} <{}> (admin)", user.name, user.email)
                    }
                    Some(user) => println!("{} <{}>", user.name, user.email),
                    None => println!("Not logged in"),
                }
                Ok(())
            }
            Commands::Profile {
                name,
                email,
                password,
            } => {
                let update = ProfileUpdate {
                    name,
                    email,
                    password,
                    ..Default::default()
                };
                let user = self
                    .session
                    .update_profile(&self.api, &update)
                    .await
                    .map_err(|e| self.explain(e))?;
                println!("Profile updated: {} <{}>", user.name, user.email);
                Ok(())
            }
            Commands::Book {
                property,
                check_in,
                check_out,
                guests,
                card_number,
                expiry,
                cvc,
                card_name,
            } => {
                let payment = PaymentForm {
                    card_number,
                    expiry,
                    cvc,
                    card_name,
                };
                self.book(&property, check_in, check_out, guests, &payment)
                    .await
            }
            Commands::Bookings => {
                let mut view = BookingsView::new(self.locale);
                view.load(&self.api, &self.session)
                    .await
                    .map_err(|e| self.explain(e))?;
                let bookings = view.bookings.ready().map(Vec::as_slice).unwrap_or_default();
                if bookings.is_empty() {
                    println!("No bookings yet");
                }
                for booking in bookings {
                    print_booking(booking);
                }
                Ok(())
            }
            Commands::Booking { id } => {
                let mut view = ConfirmationView::new(self.locale);
                view.load(&self.api, &self.session, &id)
                    .await
                    .map_err(|e| self.explain(e))?;
                if let Some(booking) = view.booking.ready() {
                    print_booking(booking);
                }
                Ok(())
            }
            Commands::Cancel { id } => {
                let mut view = BookingsView::new(self.locale);
                view.load(&self.api, &self.session)
                    .await
                    .map_err(|e| self.explain(e))?;
                let cancelled = view
                    .cancel(&self.api, &self.session, &id)
                    .await
                    .map_err(|e| self.explain(e))?;
                if cancelled {
                    println!("Booking {} cancelled", id);
                } else {
                    println!("Booking {} cannot be cancelled", id);
                }
                Ok(())
            }
            Commands::Review {
                property,
                rating,
                comment,
            } => {
                let mut view = ReviewView::new(self.locale, &property);
                view.draft.rating = rating;
                view.draft.comment = comment;
                let route = view
                    .submit(&self.api, &self.session)
                    .await
                    .map_err(|e| self.explain(e))?;
                if let Some(route) = route {
                    println!("Review posted, see {}", route);
                }
                Ok(())
            }
        }
    }

    fn quote(&self, quote: &BookingQuote) -> Result<()> {
        let today = Local::now().date_naive();
        print_breakdown(&quote.breakdown());

        let violations = quote.violations(today);
        for violation in &violations {
            let err = ValidationError::from(violation.clone());
            eprintln!("  {}: {}", err.field(), err.message(self.locale));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("quote is not bookable"))
        }
    }

    async fn book(
        &self,
        property_id: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
        payment: &PaymentForm,
    ) -> Result<()> {
        let mut detail = PropertyDetailView::new(self.locale);
        detail.load(&self.api, property_id).await;
        if let Some(message) = detail.property.error() {
            return Err(anyhow!(message.to_string()));
        }
        let flow = detail
            .flow_mut()
            .ok_or_else(|| anyhow!("property {} is not loaded", property_id))?;

        flow.set_check_in(check_in).map_err(|e| self.explain_flow(e))?;
        flow.set_check_out(check_out).map_err(|e| self.explain_flow(e))?;
        flow.set_guests(guests).map_err(|e| self.explain_flow(e))?;

        if let Err(err) = flow.review(Local::now().date_naive()) {
            for field_error in flow.errors() {
                eprintln!("  {}: {}", field_error.field(), field_error.message(self.locale));
            }
            return Err(self.explain_flow(err));
        }
        if let Some(breakdown) = flow.breakdown() {
            print_breakdown(&breakdown);
        }

        let route = flow
            .submit(&self.api, &self.session, payment)
            .await
            .map_err(|e| self.explain_flow(e))?;
        println!("Paid with card {}", payment.masked_number());

        if let Route::BookingConfirmation(id) = &route {
            let mut confirmation = ConfirmationView::new(self.locale);
            confirmation
                .load(&self.api, &self.session, id)
                .await
                .map_err(|e| self.explain(e))?;
            if let Some(booking) = confirmation.booking.ready() {
                print_booking(booking);
            }
        }
        println!("Confirmation: {}", route);
        Ok(())
    }

    fn print_listing(&self, view: &PropertyListView) -> Result<()> {
        if let Some(message) = view.properties.error() {
            return Err(anyhow!(message.to_string()));
        }
        let Some(page) = view.properties.ready() else {
            return Ok(());
        };
        if page.properties.is_empty() {
            println!("No properties found");
        }
        for property in &page.properties {
            print_property_line(property);
        }
        if let (Some(current), Some(pages)) = (page.page, page.pages) {
            println!("Page {} of {}", current, pages);
        }
        Ok(())
    }

    fn print_detail(&self, view: &PropertyDetailView) -> Result<()> {
        if let Some(message) = view.property.error() {
            return Err(anyhow!(message.to_string()));
        }
        let Some(property) = view.property.ready() else {
            return Ok(());
        };

        println!("{} ({:?})", property.title, property.property_type);
        println!("{}", property.location());
        println!(
            "{} per night, up to {} guests, {} bedrooms, {} bathrooms",
            money(property.price_per_night),
            property.max_guests,
            property.bedrooms,
            property.bathrooms
        );
        if !property.amenities.is_empty() {
            println!("Amenities: {}", property.amenities.join(", "));
        }
        println!("{}", property.description);

        match (&view.reviews, view.average_rating()) {
            (_, Some(average)) => {
                println!("Rating {:.1}/5", average);
                for review in view.reviews.ready().into_iter().flatten() {
                    println!("  {}/5 {}: {}", review.rating, review.user.name, review.comment);
                }
            }
            (reviews, None) => match reviews.error() {
                Some(message) => eprintln!("{}", message),
                None => println!("No reviews yet"),
            },
        }
        Ok(())
    }
}

fn money(amount: f64) -> String {
    format!("{:.2} €", amount)
}

fn print_breakdown(breakdown: &PriceBreakdown) {
    println!("Nights:       {}", breakdown.nights);
    println!("Subtotal:     {}", money(breakdown.subtotal));
    println!("Cleaning fee: {}", money(breakdown.cleaning_fee));
    println!("Service fee:  {}", money(breakdown.service_fee));
    println!("Total:        {}", money(breakdown.total));
}

fn print_property_line(property: &Property) {
    println!(
        "{}  {}  {}  {}/night",
        property.id,
        property.title,
        property.location(),
        money(property.price_per_night)
    );
}

fn print_booking(booking: &Booking) {
    let title = booking.property.title().unwrap_or(booking.property.id());
    println!(
        "{}  {}  {} -> {}  {} guests  {}  {:?}{}",
        booking.id,
        title,
        booking.check_in_date,
        booking.check_out_date,
        booking.guest_count,
        money(booking.total_price),
        booking.status,
        if booking.is_paid { " (paid)" } else { "" }
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("rental_client=debug,rental=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    let app = App::new(&config)?;
    app.run(cli.command).await
}
