//! CLI commands and their execution against a [`CachedApiClient`].

use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;

use crate::api::types::{
  Channel, GooglePlace, GooglePlaceSearchParams, Property, PropertyQueryParams, Review,
  ReviewApproval, ReviewQueryParams, ReviewStatus,
};
use crate::api::{ApiError, CachedApiClient};
use crate::cache::{CacheResult, CacheSource};
use crate::search;
use crate::services::RegisterData;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Sign in and keep the session for later commands
  Login {
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    password: String,
  },
  /// Create a manager account and sign in
  Register {
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    password: String,
    #[arg(short, long)]
    name: String,
  },
  /// End the session and drop cached data
  Logout,
  /// Show the signed-in manager
  #[command(alias = "whoami")]
  Profile,
  /// Rotate the session token
  Refresh,
  /// List reviews
  #[command(alias = "ls")]
  Reviews(ReviewFilters),
  /// Reviews waiting for moderation
  Pending,
  /// Approved reviews
  Approved {
    #[arg(long)]
    property: Option<String>,
  },
  /// Show one review
  Review { id: u64 },
  /// Approve a review
  Approve {
    id: u64,
    #[arg(short, long)]
    reason: Option<String>,
  },
  /// Reject a review
  Reject {
    id: u64,
    #[arg(short, long)]
    reason: Option<String>,
  },
  /// Approve and reject several reviews in one call
  Bulk {
    #[arg(long, value_delimiter = ',')]
    approve: Vec<u64>,
    #[arg(long, value_delimiter = ',')]
    reject: Vec<u64>,
    #[arg(short, long)]
    reason: Option<String>,
  },
  /// Dashboard figures
  Stats,
  /// List properties
  Properties {
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    min_rating: Option<f64>,
    #[arg(short, long)]
    search: Option<String>,
  },
  /// Show one property with its review figures
  Property {
    id: String,
    /// Also list its reviews
    #[arg(long)]
    reviews: bool,
  },
  /// Google Places lookups
  #[command(subcommand)]
  Google(GoogleCommand),
  /// Moderation decisions recorded on this machine
  Local,
  /// Reviews saved from the last online listing
  Archived,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GoogleCommand {
  /// Search places by text
  Places {
    query: String,
    #[arg(long)]
    location: Option<String>,
    /// Metres around the location
    #[arg(long)]
    radius: Option<u32>,
  },
  /// Show one place
  Place {
    place_id: String,
    /// Also list its normalized reviews
    #[arg(long)]
    reviews: bool,
  },
  /// Google reviews of a property, by name
  Search {
    property_name: String,
    /// Defaults to London, UK
    #[arg(long)]
    location: Option<String>,
  },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReviewFilters {
  #[arg(long)]
  property: Option<String>,
  #[arg(long, value_parser = parse_wire::<ReviewStatus>)]
  status: Option<ReviewStatus>,
  #[arg(long, value_parser = parse_wire::<Channel>)]
  channel: Option<Channel>,
  /// Rating floor
  #[arg(long)]
  min_rating: Option<f64>,
  #[arg(long)]
  category: Option<String>,
  #[arg(long)]
  approved: Option<bool>,
  /// Fetch one page instead of the whole list
  #[arg(long)]
  page: Option<u32>,
  #[arg(long)]
  limit: Option<u32>,
  /// Filter the fetched reviews by guest, listing or comment text
  #[arg(short, long)]
  search: Option<String>,
}

impl ReviewFilters {
  fn params(&self) -> ReviewQueryParams {
    ReviewQueryParams {
      property_id: self.property.clone(),
      rating: self.min_rating,
      category: self.category.clone(),
      channel: self.channel,
      status: self.status,
      is_approved: self.approved,
      page: self.page,
      limit: self.limit,
      ..Default::default()
    }
  }
}

/// Parse a value the way the gateway spells it, e.g. `pending` or `airbnb`.
fn parse_wire<T: DeserializeOwned>(s: &str) -> Result<T, String> {
  serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
    .map_err(|_| format!("unknown value '{}'", s))
}

/// Turn a gateway error into a report carrying the user-facing copy.
fn report(err: ApiError) -> color_eyre::Report {
  eyre!("{}", err.user_message())
}

/// Data of a read, with a note on stderr when it was served from cache
/// because the gateway could not be reached.
fn served<T>(result: CacheResult<T>) -> T {
  if result.source == CacheSource::Offline {
    match result.cached_at {
      Some(at) => eprintln!(
        "offline: showing data cached at {}",
        at.format("%Y-%m-%d %H:%M")
      ),
      None => eprintln!("offline: showing cached data"),
    }
  }
  result.data
}

pub async fn execute(client: &CachedApiClient, command: Command) -> Result<()> {
  match command {
    Command::Login { email, password } => {
      let user = client.login(&email, &password).await.map_err(report)?;
      println!("Signed in as {} <{}>", user.name, user.email);
    }
    Command::Register {
      email,
      password,
      name,
    } => {
      let data = RegisterData {
        email,
        password,
        name,
        role: Default::default(),
      };
      let user = client.register(&data).await.map_err(report)?;
      println!("Registered and signed in as {} <{}>", user.name, user.email);
    }
    Command::Logout => {
      client.logout().await;
      println!("Signed out");
    }
    Command::Profile => {
      let user = served(client.profile().await.map_err(report)?);
      println!("{} <{}> ({:?})", user.name, user.email, user.role);
    }
    Command::Refresh => {
      client.refresh().await.map_err(report)?;
      println!("Session token rotated");
    }
    Command::Reviews(filters) => {
      let params = filters.params();
      let reviews = if params.page.is_some() || params.limit.is_some() {
        let page = served(client.reviews_page(&params).await.map_err(report)?);
        println!(
          "Page {} of {} ({} reviews)",
          page.meta.page, page.meta.total_pages, page.meta.total
        );
        page.data
      } else {
        served(client.reviews(&params).await.map_err(report)?)
      };
      print_reviews(&reviews, filters.search.as_deref());
    }
    Command::Pending => {
      let reviews = served(client.pending_reviews().await.map_err(report)?);
      print_reviews(&reviews, None);
    }
    Command::Approved { property } => {
      let reviews = served(
        client
          .approved_reviews(property.as_deref())
          .await
          .map_err(report)?,
      );
      print_reviews(&reviews, None);
    }
    Command::Review { id } => {
      let review = served(client.review(id).await.map_err(report)?);
      print_review_detail(&review);
    }
    Command::Approve { id, reason } => {
      let ack = client
        .approve(id, reason.as_deref())
        .await
        .map_err(report)?;
      println!("{}", or_default(&ack.message, "Review approved"));
    }
    Command::Reject { id, reason } => {
      let ack = client.reject(id, reason.as_deref()).await.map_err(report)?;
      println!("{}", or_default(&ack.message, "Review rejected"));
    }
    Command::Bulk {
      approve,
      reject,
      reason,
    } => {
      let updates: Vec<ReviewApproval> = approve
        .iter()
        .map(|&id| (id, true))
        .chain(reject.iter().map(|&id| (id, false)))
        .map(|(review_id, approved)| ReviewApproval {
          review_id,
          approved,
          reason: reason.clone(),
        })
        .collect();
      let result = client.bulk_update(&updates).await.map_err(report)?;
      println!("Processed {} reviews", result.processed);
    }
    Command::Stats => {
      let stats = served(client.dashboard_stats().await.map_err(report)?);
      println!("Reviews:    {}", stats.total_reviews);
      println!("Approved:   {}", stats.approved_reviews);
      println!("Pending:    {}", stats.pending_reviews);
      println!("Properties: {}", stats.properties_count);
      println!("Average:    {:.1}", stats.average_rating);
      for (rating, count) in stats.rating_distribution.iter().rev() {
        println!("  {:>2}: {}", rating, count);
      }
      if !stats.recent_reviews.is_empty() {
        println!("Recent:");
        print_reviews(&stats.recent_reviews, None);
      }
    }
    Command::Properties {
      city,
      country,
      min_rating,
      search,
    } => {
      let params = PropertyQueryParams {
        city,
        country,
        min_rating,
        search,
        ..Default::default()
      };
      let properties = served(client.properties(&params).await.map_err(report)?);
      for property in &properties {
        print_property(property);
      }
    }
    Command::Property { id, reviews } => {
      let property = served(client.property(&id).await.map_err(report)?);
      let stats = served(client.property_stats(&id).await.map_err(report)?);
      print_property(&property);
      println!(
        "  {} approved, {} pending, {:.1} average",
        stats.approved_reviews, stats.pending_reviews, stats.average_rating
      );
      if reviews {
        let list = served(
          client
            .property_reviews(&id, &ReviewQueryParams::default())
            .await
            .map_err(report)?,
        );
        print_reviews(&list, None);
      }
    }
    Command::Google(command) => google(client, command).await?,
    Command::Local => {
      for record in client.moderation().records()? {
        println!(
          "#{} {:?} at {}",
          record.id,
          record.status,
          record.last_updated.format("%Y-%m-%d %H:%M")
        );
      }
    }
    Command::Archived => match client.archive().load()? {
      Some(archived) => {
        println!(
          "Saved {}",
          archived.last_updated.format("%Y-%m-%d %H:%M")
        );
        print_reviews(&archived.reviews, None);
      }
      None => println!("No reviews saved yet"),
    },
  }
  Ok(())
}

async fn google(client: &CachedApiClient, command: GoogleCommand) -> Result<()> {
  match command {
    GoogleCommand::Places {
      query,
      location,
      radius,
    } => {
      let params = GooglePlaceSearchParams {
        query,
        location,
        radius,
      };
      let places = served(client.google_places(&params).await.map_err(report)?);
      if places.is_empty() {
        println!("No places");
      }
      for place in &places {
        print_place(place);
      }
    }
    GoogleCommand::Place { place_id, reviews } => {
      let place = served(client.google_place(&place_id).await.map_err(report)?);
      print_place(&place);
      for review in &place.reviews {
        println!(
          "  {:>3.1}  {} ({}): {}",
          review.rating, review.author_name, review.relative_time_description, review.text
        );
      }
      if reviews {
        let list = served(
          client
            .google_place_reviews(&place_id)
            .await
            .map_err(report)?,
        );
        print_reviews(&list, None);
      }
    }
    GoogleCommand::Search {
      property_name,
      location,
    } => {
      let list = served(
        client
          .google_property_reviews(&property_name, location.as_deref())
          .await
          .map_err(report)?,
      );
      print_reviews(&list, None);
    }
  }
  Ok(())
}

fn or_default<'a>(message: &'a str, fallback: &'a str) -> &'a str {
  if message.is_empty() {
    fallback
  } else {
    message
  }
}

fn print_reviews(reviews: &[Review], query: Option<&str>) {
  let shown = search::filter_reviews(reviews, query.unwrap_or(""));
  if shown.is_empty() {
    println!("No reviews");
    return;
  }
  for review in shown {
    println!(
      "#{:<6} {:<9} {:>4.1}  {} @ {} ({:?})",
      review.id,
      review.status.as_str(),
      review.overall_rating,
      review.guest_name,
      review.listing_name,
      review.channel
    );
  }
}

fn print_review_detail(review: &Review) {
  println!("Review #{} ({})", review.id, review.status.as_str());
  println!("Guest:     {}", review.guest_name);
  println!("Listing:   {} [{}]", review.listing_name, review.property_id);
  println!("Submitted: {}", review.submitted_at.format("%Y-%m-%d %H:%M"));
  println!("Rating:    {:.1}", review.overall_rating);
  for (category, rating) in &review.categories {
    println!("  {}: {}", category, rating);
  }
  if !review.public_review.is_empty() {
    println!();
    println!("{}", review.public_review);
  }
}

fn print_property(property: &Property) {
  println!(
    "{:<10} {} ({}, {}) {:.1} from {} reviews",
    property.id,
    property.name,
    property.city,
    property.country,
    property.average_rating,
    property.total_reviews
  );
}

fn print_place(place: &GooglePlace) {
  println!(
    "{} {} ({}) {:.1} from {} ratings",
    place.place_id, place.name, place.formatted_address, place.rating, place.user_ratings_total
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Line {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Line::try_parse_from(std::iter::once("flexrev").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_review_filters() {
    let Command::Reviews(filters) = parse(&["reviews", "--status", "Pending", "--channel", "airbnb"])
    else {
      panic!("expected reviews command");
    };
    let params = filters.params();
    assert_eq!(params.status, Some(ReviewStatus::Pending));
    assert_eq!(params.channel, Some(Channel::Airbnb));
  }

  #[test]
  fn test_unknown_status_rejected() {
    let result = Line::try_parse_from(["flexrev", "reviews", "--status", "archived"]);
    assert!(result.is_err());
  }

  #[test]
  fn test_bulk_ids() {
    let Command::Bulk { approve, reject, .. } = parse(&["bulk", "--approve", "1,2", "--reject", "3"])
    else {
      panic!("expected bulk command");
    };
    assert_eq!(approve, vec![1, 2]);
    assert_eq!(reject, vec![3]);
  }

  #[test]
  fn test_google_search_location_is_optional() {
    let Command::Google(GoogleCommand::Search {
      property_name,
      location,
    }) = parse(&["google", "search", "Shoreditch Loft"])
    else {
      panic!("expected google search command");
    };
    assert_eq!(property_name, "Shoreditch Loft");
    assert_eq!(location, None);
  }
}
