//! Built-in marketplace taxonomy
//!
//! Fifteen top-level categories with ten subcategories each. Icons are
//! Font Awesome names without the `fa-` prefix.

pub struct TaxonomyEntry {
    pub name: &'static str,
    pub icon: &'static str,
    pub subcategories: &'static [(&'static str, &'static str)],
}

pub const TAXONOMY: &[TaxonomyEntry] = &[
    TaxonomyEntry {
        name: "Electronics",
        icon: "laptop",
        subcategories: &[
            ("Mobile Phones", "mobile-alt"),
            ("Laptops", "laptop"),
            ("Tablets", "tablet-alt"),
            ("Cameras", "camera"),
            ("Audio & Headphones", "headphones"),
            ("Gaming Consoles", "gamepad"),
            ("Smart Home Devices", "home"),
            ("Wearables", "watch"),
            ("Drones", "drone"),
            ("Accessories", "plug"),
        ],
    },
    TaxonomyEntry {
        name: "Vehicles",
        icon: "car",
        subcategories: &[
            ("Cars", "car"),
            ("Motorcycles", "motorcycle"),
            ("Bicycles", "bicycle"),
            ("Trucks & Commercial", "truck"),
            ("Auto Parts", "cog"),
            ("Boats", "ship"),
            ("RVs & Campers", "caravan"),
            ("Electric Vehicles", "bolt"),
            ("Scooters", "moped"),
            ("Car Accessories", "tools"),
        ],
    },
    TaxonomyEntry {
        name: "Furniture",
        icon: "couch",
        subcategories: &[
            ("Living Room", "couch"),
            ("Bedroom", "bed"),
            ("Kitchen & Dining", "utensils"),
            ("Office", "chair"),
            ("Outdoor", "umbrella-beach"),
            ("Antiques", "clock"),
            ("Storage", "box"),
            ("Kids Furniture", "baby-carriage"),
            ("Mattresses", "bed"),
            ("Home Decor", "paint-roller"),
        ],
    },
    TaxonomyEntry {
        name: "Fashion",
        icon: "tshirt",
        subcategories: &[
            ("Mens Clothing", "tshirt"),
            ("Womens Clothing", "female"),
            ("Shoes", "shoe-prints"),
            ("Bags", "shopping-bag"),
            ("Accessories", "glasses"),
            ("Watches", "watch"),
            ("Jewelry", "gem"),
            ("Kids Clothing", "child"),
            ("Athleisure", "running"),
            ("Formal Wear", "user-tie"),
        ],
    },
    TaxonomyEntry {
        name: "Home & Garden",
        icon: "home",
        subcategories: &[
            ("Appliances", "blender"),
            ("Kitchenware", "utensils"),
            ("Garden Tools", "leaf"),
            ("Decor", "paint-roller"),
            ("Lighting", "lightbulb"),
            ("Storage Solutions", "box"),
            ("Bedding", "bed"),
            ("Bathroom", "bath"),
            ("Outdoor Living", "tree"),
            ("Cleaning Supplies", "broom"),
        ],
    },
    TaxonomyEntry {
        name: "Sports & Recreation",
        icon: "football-ball",
        subcategories: &[
            ("Fitness Equipment", "dumbbell"),
            ("Outdoor Sports", "hiking"),
            ("Water Sports", "swimmer"),
            ("Winter Sports", "skating"),
            ("Team Sports", "basketball-ball"),
            ("Camping Gear", "campground"),
            ("Cycling", "bicycle"),
            ("Fishing", "fish"),
            ("Golf", "golf-ball"),
            ("Athletic Apparel", "tshirt"),
        ],
    },
    TaxonomyEntry {
        name: "Books & Media",
        icon: "book",
        subcategories: &[
            ("Books", "book"),
            ("Movies & TV", "film"),
            ("Music", "music"),
            ("Video Games", "gamepad"),
            ("Magazines", "newspaper"),
            ("Educational", "graduation-cap"),
            ("Audiobooks", "headphones"),
            ("Comics", "book-open"),
            ("E-books", "tablet-alt"),
            ("Vinyl Records", "record-vinyl"),
        ],
    },
    TaxonomyEntry {
        name: "Pets",
        icon: "paw",
        subcategories: &[
            ("Dogs", "dog"),
            ("Cats", "cat"),
            ("Fish & Aquarium", "fish"),
            ("Birds", "dove"),
            ("Small Pets", "otter"),
            ("Pet Supplies", "bone"),
            ("Reptiles", "dragon"),
            ("Pet Grooming", "brush"),
            ("Pet Training", "dog-leashed"),
            ("Pet Accessories", "collar"),
        ],
    },
    TaxonomyEntry {
        name: "Services",
        icon: "tools",
        subcategories: &[
            ("Home Services", "tools"),
            ("Automotive Services", "car-battery"),
            ("Personal Services", "user"),
            ("Professional Services", "briefcase"),
            ("Educational Services", "chalkboard-teacher"),
            ("Health & Beauty", "heart"),
            ("Event Planning", "calendar-alt"),
            ("Repair Services", "wrench"),
            ("Cleaning Services", "broom"),
            ("Financial Services", "dollar-sign"),
        ],
    },
    TaxonomyEntry {
        name: "Jobs",
        icon: "briefcase",
        subcategories: &[
            ("Full Time", "clock"),
            ("Part Time", "hourglass-half"),
            ("Contract", "file-contract"),
            ("Internship", "user-graduate"),
            ("Remote Work", "laptop-house"),
            ("Freelance", "pen"),
            ("Temporary", "hourglass"),
            ("Seasonal", "leaf"),
            ("Volunteer", "hands-helping"),
            ("Executive", "user-tie"),
        ],
    },
    TaxonomyEntry {
        name: "Food & Beverages",
        icon: "utensils",
        subcategories: &[
            ("Fruits & Vegetables", "carrot"),
            ("Meat & Seafood", "fish"),
            ("Dairy", "cheese"),
            ("Bakery", "bread-slice"),
            ("Beverages", "coffee"),
            ("Snacks", "cookie"),
            ("Organic Foods", "leaf"),
            ("Canned Goods", "can"),
            ("Spices & Seasonings", "pepper-hot"),
            ("Desserts", "ice-cream"),
        ],
    },
    TaxonomyEntry {
        name: "Travel",
        icon: "plane",
        subcategories: &[
            ("Flights", "plane"),
            ("Hotels", "hotel"),
            ("Car Rentals", "car"),
            ("Cruises", "ship"),
            ("Tours", "map"),
            ("Camping", "campground"),
            ("Adventure Travel", "hiking"),
            ("Travel Accessories", "suitcase"),
            ("Vacation Packages", "umbrella-beach"),
            ("Travel Insurance", "shield-alt"),
        ],
    },
    TaxonomyEntry {
        name: "Health & Wellness",
        icon: "heart",
        subcategories: &[
            ("Vitamins & Supplements", "capsules"),
            ("Fitness Equipment", "dumbbell"),
            ("Personal Care", "brush"),
            ("Medical Supplies", "first-aid"),
            ("Skincare", "spa"),
            ("Haircare", "scissors"),
            ("Mental Health", "brain"),
            ("Nutrition", "apple-alt"),
            ("Alternative Medicine", "mortar-pestle"),
            ("Wellness Services", "hand-holding-heart"),
        ],
    },
    TaxonomyEntry {
        name: "Toys & Games",
        icon: "puzzle-piece",
        subcategories: &[
            ("Action Figures", "robot"),
            ("Board Games", "dice"),
            ("Puzzles", "puzzle-piece"),
            ("Dolls", "doll"),
            ("Building Sets", "cubes"),
            ("Educational Toys", "graduation-cap"),
            ("Outdoor Toys", "football-ball"),
            ("Electronic Toys", "battery-full"),
            ("Collectibles", "star"),
            ("Craft Kits", "paint-brush"),
        ],
    },
    TaxonomyEntry {
        name: "Art & Crafts",
        icon: "paint-brush",
        subcategories: &[
            ("Painting Supplies", "paint-brush"),
            ("Drawing Tools", "pencil-alt"),
            ("Sculpting", "hammer"),
            ("Crafting Materials", "cut"),
            ("Sewing & Knitting", "thread"),
            ("Scrapbooking", "book"),
            ("Jewelry Making", "gem"),
            ("Pottery", "mug-saucer"),
            ("Printmaking", "print"),
            ("DIY Kits", "tools"),
        ],
    },
];
